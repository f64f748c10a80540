//! A single resumable archive transfer.
//!
//! A transfer runs as its own tokio task. It requests the archive from the
//! resume offset, appends what arrives to the partial file, and reports each
//! step over an unbounded channel tagged with its attempt number. When the
//! body is complete the partial file is promoted and hashed before
//! `Complete` is reported. The task's return value is the number of bytes
//! durably written, which is how an abort is acknowledged to whoever is
//! waiting on the [`TransferHandle`].

use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::checksum::calculate_file_checksum;
use super::staging::ArchivePaths;
use crate::http::HttpClient;
use crate::manager::record::{AppId, FailureKind};

/// Parameters of one transfer attempt.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub id: AppId,
    pub attempt: u64,
    pub url: String,
    /// Partial and completed archive locations.
    pub paths: ArchivePaths,
    /// Bytes already durable from earlier attempts.
    pub resume_offset: u64,
    /// Archive size announced by the manifest, if any.
    pub expected_total: Option<u64>,
}

/// What happened during a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    /// Bytes on disk so far, and the total once known.
    Progress { bytes: u64, total: Option<u64> },
    /// The whole archive is on disk at its final path.
    Complete { bytes: u64, digest: String },
    /// The transfer stopped on its own.
    Failed(FailureKind),
}

/// Update tagged with the record and attempt it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub id: AppId,
    pub attempt: u64,
    pub update: TransferUpdate,
}

/// Control side of a running transfer.
#[derive(Debug)]
pub struct TransferHandle {
    id: AppId,
    attempt: u64,
    cancel: CancellationToken,
    join: JoinHandle<u64>,
}

impl TransferHandle {
    /// Ask the transfer to stop without waiting for it.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Abort and wait until the task has stopped writing.
    ///
    /// Returns the bytes durable on disk, or `None` if the task panicked.
    pub async fn abort_and_wait(self) -> Option<u64> {
        self.cancel.cancel();
        match self.join.await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(app = %self.id, attempt = self.attempt, error = %e, "Transfer task failed");
                None
            }
        }
    }
}

/// Starts transfer tasks.
#[derive(Clone)]
pub struct Transfer {
    client: Arc<dyn HttpClient>,
    stall_timeout: Duration,
}

impl Transfer {
    /// # Arguments
    ///
    /// * `client` - HTTP client used for archive requests
    /// * `stall_timeout` - Longest wait for the next body chunk before the
    ///   transfer fails with a network error
    pub fn new(client: Arc<dyn HttpClient>, stall_timeout: Duration) -> Self {
        Self {
            client,
            stall_timeout,
        }
    }

    /// Spawn a transfer. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        request: TransferRequest,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> TransferHandle {
        let cancel = CancellationToken::new();
        let id = request.id.clone();
        let attempt = request.attempt;

        let task = TransferTask {
            client: Arc::clone(&self.client),
            stall_timeout: self.stall_timeout,
            request,
            cancel: cancel.clone(),
            events,
        };
        let join = tokio::spawn(task.run());

        TransferHandle {
            id,
            attempt,
            cancel,
            join,
        }
    }
}

enum Outcome {
    Completed(u64),
    Failed(FailureKind, u64),
    Aborted(u64),
}

struct TransferTask {
    client: Arc<dyn HttpClient>,
    stall_timeout: Duration,
    request: TransferRequest,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferTask {
    async fn run(self) -> u64 {
        match self.execute().await {
            Outcome::Completed(bytes) => match self.finalize().await {
                Ok(digest) => {
                    info!(app = %self.request.id, attempt = self.request.attempt, bytes, "Transfer complete");
                    self.emit(TransferUpdate::Complete { bytes, digest });
                    bytes
                }
                Err(e) => {
                    warn!(app = %self.request.id, error = %e, "Cannot finalize archive");
                    self.emit(TransferUpdate::Failed(FailureKind::Storage));
                    bytes
                }
            },
            Outcome::Failed(kind, bytes) => {
                warn!(app = %self.request.id, attempt = self.request.attempt, bytes, failure = %kind, "Transfer failed");
                self.emit(TransferUpdate::Failed(kind));
                bytes
            }
            Outcome::Aborted(bytes) => {
                debug!(app = %self.request.id, attempt = self.request.attempt, bytes, "Transfer aborted");
                bytes
            }
        }
    }

    fn emit(&self, update: TransferUpdate) {
        // The receiver is gone only when the state machine has shut down.
        let _ = self.events.send(TransferEvent {
            id: self.request.id.clone(),
            attempt: self.request.attempt,
            update,
        });
    }

    /// Promote the partial archive and hash it.
    async fn finalize(&self) -> io::Result<String> {
        let paths = self.request.paths.clone();
        tokio::task::spawn_blocking(move || {
            paths.promote()?;
            calculate_file_checksum(&paths.complete)
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn execute(&self) -> Outcome {
        let offset = durable_offset(&self.request.paths, self.request.resume_offset).await;
        let expected_total = self.request.expected_total;

        debug!(
            app = %self.request.id,
            attempt = self.request.attempt,
            url = %self.request.url,
            offset,
            "Requesting archive"
        );

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Outcome::Aborted(offset),
            response = self.client.get(&self.request.url, Some(offset)) => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(app = %self.request.id, error = %e, "Archive request failed");
                return Outcome::Failed(FailureKind::Network, offset);
            }
        };

        // Bytes at the front of the body that are already on disk.
        let (mut skip, total) = match response.status {
            206 => (
                0,
                response
                    .content_length
                    .map(|length| offset + length)
                    .or(expected_total),
            ),
            200 => (offset, response.content_length.or(expected_total)),
            416 if offset > 0 && expected_total == Some(offset) => {
                return Outcome::Completed(offset);
            }
            status => {
                let kind = FailureKind::from_status(status).unwrap_or(FailureKind::Network);
                debug!(app = %self.request.id, status, "Archive request rejected");
                return Outcome::Failed(kind, offset);
            }
        };

        let mut file = match open_destination(&self.request.paths.partial, offset).await {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    app = %self.request.id,
                    path = %self.request.paths.partial.display(),
                    error = %e,
                    "Cannot open partial archive"
                );
                return Outcome::Failed(FailureKind::Storage, offset);
            }
        };

        let mut written = offset;
        self.emit(TransferUpdate::Progress {
            bytes: written,
            total,
        });

        let mut body = response.body;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return match file.flush().await {
                        Ok(()) => Outcome::Aborted(written),
                        Err(_) => Outcome::Aborted(offset),
                    };
                }
                next = tokio::time::timeout(self.stall_timeout, body.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    warn!(app = %self.request.id, error = %e, "Archive body interrupted");
                    let _ = file.flush().await;
                    return Outcome::Failed(FailureKind::Network, written);
                }
                Err(_) => {
                    warn!(
                        app = %self.request.id,
                        timeout_secs = self.stall_timeout.as_secs_f64(),
                        "Archive transfer stalled"
                    );
                    let _ = file.flush().await;
                    return Outcome::Failed(FailureKind::Network, written);
                }
            };

            let chunk = if skip > 0 {
                let dropped = skip.min(chunk.len() as u64) as usize;
                skip -= dropped as u64;
                chunk.slice(dropped..)
            } else {
                chunk
            };
            if chunk.is_empty() {
                continue;
            }

            if let Err(e) = file.write_all(&chunk).await {
                warn!(app = %self.request.id, error = %e, "Cannot write partial archive");
                return Outcome::Failed(FailureKind::Storage, written);
            }
            written += chunk.len() as u64;

            self.emit(TransferUpdate::Progress {
                bytes: written,
                total,
            });
        }

        if let Err(e) = file.flush().await {
            warn!(app = %self.request.id, error = %e, "Cannot flush partial archive");
            return Outcome::Failed(FailureKind::Storage, written);
        }

        // The response length wins over the manifest's announced size.
        if total.is_some_and(|expected| expected != written) {
            warn!(
                app = %self.request.id,
                written,
                ?total,
                ?expected_total,
                "Archive size mismatch"
            );
            return Outcome::Failed(FailureKind::Network, written);
        }

        Outcome::Completed(written)
    }
}

/// Resume offset clamped to what is actually on disk.
///
/// An archive promoted by an attempt that was paused before its completion
/// was recorded is staged again so the transfer can finish from it.
async fn durable_offset(paths: &ArchivePaths, requested: u64) -> u64 {
    if requested == 0 {
        return 0;
    }

    if fs::metadata(&paths.partial).await.is_err() && fs::metadata(&paths.complete).await.is_ok() {
        if let Err(e) = fs::rename(&paths.complete, &paths.partial).await {
            warn!(path = %paths.complete.display(), error = %e, "Cannot restage archive");
            return 0;
        }
    }

    match fs::metadata(&paths.partial).await {
        Ok(metadata) => requested.min(metadata.len()),
        Err(_) => 0,
    }
}

/// Open the partial archive positioned at `offset`, dropping anything past it.
async fn open_destination(path: &Path, offset: u64) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await?;
    file.set_len(offset).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}
