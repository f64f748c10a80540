//! On-disk locations of package archives.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::manager::record::AppId;

/// Partial and completed archive paths for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    /// Archive being received; its length is the durable resume offset.
    pub partial: PathBuf,
    /// Archive after a completed transfer.
    pub complete: PathBuf,
}

impl ArchivePaths {
    /// Paths for `id` under the packages directory.
    pub fn for_app(packages_dir: &Path, id: &AppId) -> Self {
        let key = id.storage_key();
        Self {
            partial: packages_dir.join(format!("{}.part", key)),
            complete: packages_dir.join(format!("{}.zip", key)),
        }
    }

    /// Move the partial archive into place after a completed transfer.
    pub fn promote(&self) -> io::Result<()> {
        fs::rename(&self.partial, &self.complete)
    }

    /// Delete both files. Missing files are ignored.
    pub fn remove_all(&self) -> io::Result<()> {
        for path in [&self.partial, &self.complete] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
