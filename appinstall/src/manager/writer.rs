//! Ordered, off-runtime record persistence.
//!
//! After startup the state machine never touches its [`RecordStore`]
//! directly. Saves and removals are queued to one writer task, which runs
//! them in issue order on the blocking pool. Queuing is cheap, so callers do
//! it while still holding the registry lock: the order on disk then matches
//! the order of the in-memory changes, and no lock is held during file I/O.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::icon::CachedIcon;
use super::record::{AppId, InstallRecord};
use super::store::{RecordStore, StoreError};

type Reply = oneshot::Sender<Result<(), StoreError>>;

enum StoreOp {
    Save {
        record: InstallRecord,
        reply: Option<Reply>,
    },
    SaveIcon {
        id: AppId,
        icon: CachedIcon,
    },
    Remove {
        id: AppId,
        reply: Reply,
    },
    Flush {
        reply: Reply,
    },
}

impl StoreOp {
    fn run(self, store: &dyn RecordStore) {
        match self {
            StoreOp::Save { record, reply } => {
                let result = store.save(&record);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(app = %record.id(), error = %e, "Failed to persist install record");
                        }
                    }
                }
            }
            StoreOp::SaveIcon { id, icon } => {
                if let Err(e) = store.save_icon(&id, &icon) {
                    warn!(app = %id, error = %e, "Failed to persist cached icon");
                }
            }
            StoreOp::Remove { id, reply } => {
                let _ = reply.send(store.remove(&id));
            }
            StoreOp::Flush { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

/// A queued operation whose outcome the caller wants.
#[must_use]
pub(crate) struct Pending(oneshot::Receiver<Result<(), StoreError>>);

impl Pending {
    pub(crate) async fn wait(self) -> Result<(), StoreError> {
        self.0.await.unwrap_or(Err(StoreError::Closed))
    }
}

/// Sending side of the writer task.
#[derive(Clone)]
pub(crate) struct StoreWriter {
    ops: mpsc::UnboundedSender<StoreOp>,
}

impl StoreWriter {
    /// Spawn the writer. Must be called from within a tokio runtime.
    ///
    /// The task drains what is queued and stops once every writer handle is
    /// dropped.
    pub(crate) fn spawn(store: Arc<dyn RecordStore>) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, rx));
        Self { ops }
    }

    /// Queue a save. Failures are logged.
    pub(crate) fn save(&self, record: &InstallRecord) {
        self.send(StoreOp::Save {
            record: record.clone(),
            reply: None,
        });
    }

    /// Queue a save whose failure the caller handles.
    pub(crate) fn save_acked(&self, record: &InstallRecord) -> Pending {
        let (reply, rx) = oneshot::channel();
        self.send(StoreOp::Save {
            record: record.clone(),
            reply: Some(reply),
        });
        Pending(rx)
    }

    pub(crate) fn save_icon(&self, id: &AppId, icon: &CachedIcon) {
        self.send(StoreOp::SaveIcon {
            id: id.clone(),
            icon: icon.clone(),
        });
    }

    pub(crate) fn remove(&self, id: &AppId) -> Pending {
        let (reply, rx) = oneshot::channel();
        self.send(StoreOp::Remove {
            id: id.clone(),
            reply,
        });
        Pending(rx)
    }

    /// Resolves once everything queued before it has been written.
    pub(crate) fn flush(&self) -> Pending {
        let (reply, rx) = oneshot::channel();
        self.send(StoreOp::Flush { reply });
        Pending(rx)
    }

    fn send(&self, op: StoreOp) {
        // A send only fails once the task is gone; the reply side then
        // reports `Closed` and fire-and-forget saves are lost with it.
        if self.ops.send(op).is_err() {
            debug!("Record writer stopped; dropping store operation");
        }
    }
}

async fn run(store: Arc<dyn RecordStore>, mut ops: mpsc::UnboundedReceiver<StoreOp>) {
    while let Some(op) = ops.recv().await {
        let store = Arc::clone(&store);
        if let Err(e) = tokio::task::spawn_blocking(move || op.run(store.as_ref())).await {
            warn!(error = %e, "Record store operation panicked");
        }
    }
    debug!("Record writer stopped");
}
