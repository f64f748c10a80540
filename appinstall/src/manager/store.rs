//! Durable install record storage.
//!
//! The state machine persists through the injected [`RecordStore`] trait
//! rather than a global. [`JsonRecordStore`] keeps one JSON document per
//! record so that a torn write can only ever affect a single application,
//! and the cached icon image in a sidecar file next to it.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use super::icon::CachedIcon;
use super::record::{AppId, InstallRecord};

/// Errors raised by record persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("record store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record could not be encoded.
    #[error("failed to encode record {id}: {source}")]
    Encode {
        id: AppId,
        #[source]
        source: serde_json::Error,
    },

    /// The background writer stopped before the operation ran.
    #[error("record writer stopped")]
    Closed,
}

/// Persistence interface for install records, keyed by [`AppId`].
pub trait RecordStore: Send + Sync {
    /// Load every stored record.
    fn load_all(&self) -> Result<Vec<InstallRecord>, StoreError>;

    /// Insert or replace a record.
    fn save(&self, record: &InstallRecord) -> Result<(), StoreError>;

    /// Delete a record. Deleting a missing record is not an error.
    fn remove(&self, id: &AppId) -> Result<(), StoreError>;

    /// Persist the image bytes of a newly cached icon.
    ///
    /// [`save`](Self::save) keeps only icon metadata. Stores that hold whole
    /// records in memory have nothing more to do.
    fn save_icon(&self, _id: &AppId, _icon: &CachedIcon) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<AppId, InstallRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = InstallRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|r| (r.id().clone(), r))
                    .collect(),
            ),
        }
    }

    /// Get a stored copy of a record.
    pub fn get(&self, id: &AppId) -> Option<InstallRecord> {
        self.records.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn load_all(&self) -> Result<Vec<InstallRecord>, StoreError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn save(&self, record: &InstallRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(record.id().clone(), record.clone());
        Ok(())
    }

    fn remove(&self, id: &AppId) -> Result<(), StoreError> {
        self.records.lock().remove(id);
        Ok(())
    }
}

/// Directory of JSON documents, one per record.
///
/// Files are named after [`AppId::storage_key`]: `<key>.json` for the record
/// and `<key>.icon` for its cached icon. Writes go to a temporary file that
/// is renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &AppId) -> PathBuf {
        self.dir.join(format!("{}.json", id.storage_key()))
    }

    fn icon_path(&self, id: &AppId) -> PathBuf {
        self.dir.join(format!("{}.icon", id.storage_key()))
    }

    /// Reattach the sidecar image to a loaded record.
    fn load_icon(&self, record: &mut InstallRecord) {
        if record.icon().cached().is_none() {
            return;
        }
        let path = self.icon_path(record.id());
        let data = match fs::read(&path) {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cached icon missing; will fetch again");
                None
            }
        };
        record.icon_mut().restore(data);
    }
}

/// Write `path` through a temporary file renamed over it.
fn replace_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<fs::File>) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);
    let io_err = |source| StoreError::Io {
        path: temp_path.clone(),
        source,
    };

    let file = fs::File::create(&temp_path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer.flush().map_err(io_err)?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_if_present(path: PathBuf) -> Result<(), StoreError> {
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io { path, source }),
    }
}

impl RecordStore for JsonRecordStore {
    fn load_all(&self) -> Result<Vec<InstallRecord>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents = fs::read(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

            // A corrupt document only loses that one app.
            match serde_json::from_slice::<InstallRecord>(&contents) {
                Ok(mut record) => {
                    self.load_icon(&mut record);
                    records.push(record);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable install record");
                }
            }
        }

        Ok(records)
    }

    fn save(&self, record: &InstallRecord) -> Result<(), StoreError> {
        replace_file(&self.record_path(record.id()), |writer| {
            serde_json::to_writer_pretty(writer, record).map_err(|source| StoreError::Encode {
                id: record.id().clone(),
                source,
            })
        })
    }

    fn remove(&self, id: &AppId) -> Result<(), StoreError> {
        remove_if_present(self.icon_path(id))?;
        remove_if_present(self.record_path(id))
    }

    fn save_icon(&self, id: &AppId, icon: &CachedIcon) -> Result<(), StoreError> {
        let path = self.icon_path(id);
        replace_file(&path, |writer| {
            writer.write_all(icon.data()).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })
        })
    }
}
