//! The install state machine.
//!
//! [`InstallStateMachine`] owns every [`InstallRecord`] and is the only code
//! that changes them. Commands arrive through its async methods; transfer and
//! icon results arrive over channels drained by a background pump task.
//!
//! # Ordering
//!
//! Commands on one application are serialized by a per-record gate, an async
//! mutex held for the whole command. The registry itself is a plain mutex
//! that is never held across an await point or while publishing events, so
//! subscribers may query the machine from inside their handlers.
//!
//! A command that stops a transfer first clears the record's active attempt
//! under the registry lock and only then waits for the transfer to
//! acknowledge the abort. Any event the old attempt still delivers is
//! dropped by the pump because its attempt number is no longer active, or
//! because the record no longer exists.
//!
//! # Persistence
//!
//! Store writes go through a `StoreWriter` task and never run under the
//! registry lock. They are queued while the lock is held, so the disk sees
//! changes in the same order as the registry.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ManagerConfig;
use super::download::{
    ArchivePaths, CheckpointThrottle, Transfer, TransferEvent, TransferHandle, TransferRequest,
    TransferUpdate,
};
use super::error::{Command, ManagerError, ManagerResult};
use super::icon::{CachedIcon, IconFetcher, IconOutcome};
use super::record::{AppId, FailureKind, InstallRecord, InstallState};
use super::store::{JsonRecordStore, RecordStore};
use super::transition::{Transition, Trigger};
use super::writer::StoreWriter;
use crate::events::{InstallEvent, NotificationBus};
use crate::http::{HttpClient, ReqwestClient};
use crate::manifest::{AppKind, ManifestError, ManifestFetcher};

/// Per-application bookkeeping next to the record.
struct Entry {
    record: InstallRecord,
    /// Serializes commands on this record.
    gate: Arc<AsyncMutex<()>>,
    /// Attempt whose events are accepted; `None` while no transfer is live.
    active_attempt: Option<u64>,
    transfer: Option<TransferHandle>,
    checkpoint: CheckpointThrottle,
}

impl Entry {
    fn new(record: InstallRecord, gate: Arc<AsyncMutex<()>>, config: &ManagerConfig) -> Self {
        Self {
            record,
            gate,
            active_attempt: None,
            transfer: None,
            checkpoint: CheckpointThrottle::new(config.checkpoint_interval),
        }
    }
}

#[derive(Default)]
struct Registry {
    entries: HashMap<AppId, Entry>,
    last_attempt: u64,
}

impl Registry {
    fn next_attempt(&mut self) -> u64 {
        self.last_attempt += 1;
        self.last_attempt
    }

    fn entry_mut(&mut self, id: &AppId) -> ManagerResult<&mut Entry> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound { id: id.clone() })
    }
}

/// Install lifecycle coordinator.
///
/// Created with [`open`](Self::open), which restores persisted records and
/// starts the event pump. Must be created inside a tokio runtime.
pub struct InstallStateMachine {
    config: ManagerConfig,
    manifests: ManifestFetcher,
    icons: Arc<IconFetcher>,
    transfer: Transfer,
    writer: StoreWriter,
    bus: NotificationBus,
    registry: Mutex<Registry>,
    transfer_tx: mpsc::UnboundedSender<TransferEvent>,
    icon_tx: mpsc::UnboundedSender<IconOutcome>,
    shutdown: CancellationToken,
}

impl InstallStateMachine {
    /// Restore records from `store` and start the event pump.
    ///
    /// Records that were `pending` or `downloading` when the process stopped
    /// come back as `paused` with their offset intact.
    pub fn open(
        config: ManagerConfig,
        client: Arc<dyn HttpClient>,
        store: Arc<dyn RecordStore>,
        bus: NotificationBus,
    ) -> ManagerResult<Arc<Self>> {
        let mut registry = Registry::default();

        for mut record in store.load_all()? {
            if record.state().is_active() {
                match record.apply(Trigger::Interrupted) {
                    Ok(transition) => {
                        info!(
                            app = %record.id(),
                            previous = %transition.previous,
                            bytes = record.bytes_transferred(),
                            "Interrupted install restored as paused"
                        );
                        store.save(&record)?;
                    }
                    Err(rejected) => {
                        warn!(app = %record.id(), state = %rejected.state, "Cannot restore install");
                    }
                }
            }
            let id = record.id().clone();
            let entry = Entry::new(record, Arc::new(AsyncMutex::new(())), &config);
            registry.entries.insert(id, entry);
        }

        let (transfer_tx, transfer_rx) = mpsc::unbounded_channel();
        let (icon_tx, icon_rx) = mpsc::unbounded_channel();
        let restored = registry.entries.len();

        let machine = Arc::new(Self {
            manifests: ManifestFetcher::new(Arc::clone(&client))
                .with_max_bytes(config.max_manifest_bytes),
            icons: Arc::new(IconFetcher::new(Arc::clone(&client)).with_max_bytes(config.max_icon_bytes)),
            transfer: Transfer::new(client, config.stall_timeout),
            writer: StoreWriter::spawn(store),
            bus,
            registry: Mutex::new(registry),
            transfer_tx,
            icon_tx,
            shutdown: CancellationToken::new(),
            config,
        });

        tokio::spawn(Self::pump(
            Arc::downgrade(&machine),
            transfer_rx,
            icon_rx,
            machine.shutdown.clone(),
        ));

        info!(
            records = restored,
            data_dir = %machine.config.data_dir.display(),
            "Install state machine ready"
        );
        Ok(machine)
    }

    /// Open with the production HTTP client and a JSON store under the data
    /// directory.
    pub fn open_default(config: ManagerConfig, bus: NotificationBus) -> ManagerResult<Arc<Self>> {
        let client = Arc::new(ReqwestClient::with_connect_timeout(config.connect_timeout)?);
        let store = Arc::new(JsonRecordStore::open(config.records_dir())?);
        Self::open(config, client, store, bus)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Bus the machine publishes on.
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Install a hosted app from its manifest URL.
    ///
    /// Manifest failures are returned and leave no record behind. On success
    /// the record goes straight from `pending` to `ready`.
    pub async fn install(&self, manifest_url: &str) -> ManagerResult<InstallRecord> {
        self.create(manifest_url, AppKind::Hosted).await
    }

    /// Install a packaged app from its package manifest URL.
    ///
    /// Returns once the archive transfer has started; the outcome is
    /// reported through events.
    pub async fn install_package(&self, package_manifest_url: &str) -> ManagerResult<InstallRecord> {
        self.create(package_manifest_url, AppKind::Packaged).await
    }

    /// Stop in-flight work, keeping the offset.
    ///
    /// Waits for the transfer to acknowledge the abort, so the returned record
    /// carries every byte that reached the disk.
    pub async fn pause(&self, id: &AppId) -> ManagerResult<InstallRecord> {
        let _gate = self.lock_gate(id).await?;

        let handle = {
            let mut registry = self.registry.lock();
            let entry = registry.entry_mut(id)?;
            let state = entry.record.state();
            if !state.is_active() {
                return Err(invalid(id, state, Command::Pause));
            }
            entry.active_attempt = None;
            entry.transfer.take()
        };

        let acknowledged = match handle {
            Some(handle) => handle.abort_and_wait().await,
            None => None,
        };

        let (transition, record) = {
            let mut registry = self.registry.lock();
            let entry = registry.entry_mut(id)?;
            if let Some(bytes) = acknowledged {
                entry.record.record_progress(bytes, None);
            }
            let transition = entry
                .record
                .apply(Trigger::PauseRequested)
                .map_err(|rejected| invalid(id, rejected.state, Command::Pause))?;
            self.persist(&entry.record);
            (transition, entry.record.clone())
        };

        info!(app = %id, bytes = record.bytes_transferred(), "Install paused");
        self.announce(id, transition);
        Ok(record)
    }

    /// Retry a `paused` or `error` record.
    ///
    /// Packaged apps continue the transfer from the recorded offset. Hosted
    /// apps fetch their manifest again. Either way the icon is fetched again.
    /// `unrecoverable` records are rejected.
    pub async fn resume(&self, id: &AppId) -> ManagerResult<InstallRecord> {
        let _gate = self.lock_gate(id).await?;

        let (transition, kind, attempt, manifest_url, leftover) = {
            let mut registry = self.registry.lock();
            let attempt = registry.next_attempt();
            let entry = registry.entry_mut(id)?;
            let state = entry.record.state();
            if !state.is_resumable() {
                return Err(invalid(id, state, Command::Resume));
            }
            let transition = entry
                .record
                .apply(Trigger::ResumeRequested)
                .map_err(|rejected| invalid(id, rejected.state, Command::Resume))?;
            let kind = entry.record.kind();
            if kind == AppKind::Packaged {
                entry.active_attempt = Some(attempt);
                entry.checkpoint.reset();
            }
            self.persist(&entry.record);
            (
                transition,
                kind,
                attempt,
                entry.record.manifest_url().to_string(),
                entry.transfer.take(),
            )
        };

        if let Some(handle) = leftover {
            handle.abort_and_wait().await;
        }

        info!(app = %id, attempt, state = %transition.current, "Install resumed");
        self.announce(id, transition);

        match kind {
            AppKind::Packaged => {
                self.start_transfer(id, attempt);
                self.refresh_icon(id);
            }
            AppKind::Hosted => self.refetch_manifest(id, &manifest_url).await,
        }

        self.record(id)
            .ok_or_else(|| ManagerError::NotFound { id: id.clone() })
    }

    /// Abandon an install that has not reached `ready`.
    ///
    /// Deletes the record like [`uninstall`](Self::uninstall).
    pub async fn cancel(&self, id: &AppId) -> ManagerResult<()> {
        self.remove(id, Command::Cancel).await
    }

    /// Delete the record and its archive, aborting any transfer.
    ///
    /// Accepted in every state.
    pub async fn uninstall(&self, id: &AppId) -> ManagerResult<()> {
        self.remove(id, Command::Uninstall).await
    }

    /// Connectivity came back.
    ///
    /// Re-fetches, once, every icon whose last fetch failed. Returns the
    /// number of fetches started.
    pub fn online(&self) -> usize {
        let targets: Vec<(AppId, String)> = {
            let mut registry = self.registry.lock();
            let mut targets = Vec::new();
            for entry in registry.entries.values_mut() {
                if !entry.record.icon_mut().take_refresh() {
                    continue;
                }
                self.persist(&entry.record);
                if let Some(url) = entry.record.icon_url() {
                    targets.push((entry.record.id().clone(), url.to_string()));
                }
            }
            targets
        };

        debug!(count = targets.len(), "Refreshing icons after reconnect");
        for (id, url) in &targets {
            self.spawn_icon_fetch(id.clone(), url.clone());
        }
        targets.len()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of one record.
    pub fn record(&self, id: &AppId) -> Option<InstallRecord> {
        self.registry
            .lock()
            .entries
            .get(id)
            .map(|entry| entry.record.clone())
    }

    /// Snapshot of all records, oldest first.
    pub fn records(&self) -> Vec<InstallRecord> {
        let mut records: Vec<InstallRecord> = self
            .registry
            .lock()
            .entries
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        records
    }

    /// Wait until every change made so far is on disk.
    pub async fn flush(&self) -> ManagerResult<()> {
        Ok(self.writer.flush().wait().await?)
    }

    // =========================================================================
    // Command internals
    // =========================================================================

    async fn create(&self, url: &str, kind: AppKind) -> ManagerResult<InstallRecord> {
        let resolved = self.manifests.fetch(url, kind).await.map_err(|e| {
            warn!(url, kind = %kind, error = %e, "Install request rejected");
            e
        })?;

        let record = InstallRecord::new(&resolved);
        let id = record.id().clone();

        // Held until the first transition is announced.
        let gate = Arc::new(AsyncMutex::new(()));
        let _gate = Arc::clone(&gate).lock_owned().await;

        let saved = {
            let mut registry = self.registry.lock();
            if let Some(existing) = registry.entries.get(&id) {
                return Err(ManagerError::AlreadyInstalled {
                    id,
                    state: existing.record.state(),
                });
            }
            let saved = self.writer.save_acked(&record);
            registry
                .entries
                .insert(id.clone(), Entry::new(record, gate, &self.config));
            saved
        };
        if let Err(e) = saved.wait().await {
            self.registry.lock().entries.remove(&id);
            return Err(e.into());
        }

        info!(app = %id, kind = %kind, "Install request accepted");
        self.bus.publish(InstallEvent::Added {
            id: id.clone(),
            kind,
        });

        let (transition, attempt) = {
            let mut registry = self.registry.lock();
            let attempt = registry.next_attempt();
            let entry = registry.entry_mut(&id)?;
            let trigger = match kind {
                AppKind::Hosted => Trigger::ManifestResolved,
                AppKind::Packaged => {
                    entry.active_attempt = Some(attempt);
                    Trigger::TransferStarted
                }
            };
            let transition = entry
                .record
                .apply(trigger)
                .map_err(|rejected| invalid(&id, rejected.state, Command::Install))?;
            self.persist(&entry.record);
            (transition, attempt)
        };

        self.announce(&id, transition);
        if kind == AppKind::Packaged {
            self.start_transfer(&id, attempt);
        }
        self.refresh_icon(&id);

        self.record(&id)
            .ok_or_else(|| ManagerError::NotFound { id: id.clone() })
    }

    async fn remove(&self, id: &AppId, command: Command) -> ManagerResult<()> {
        let _gate = self.lock_gate(id).await?;

        let handle = {
            let mut registry = self.registry.lock();
            let entry = registry.entry_mut(id)?;
            let state = entry.record.state();
            if command == Command::Cancel
                && matches!(state, InstallState::Ready | InstallState::Unrecoverable)
            {
                return Err(invalid(id, state, command));
            }
            entry.active_attempt = None;
            entry.transfer.take()
        };

        let acknowledged = match handle {
            Some(handle) => handle.abort_and_wait().await,
            None => None,
        };

        let (mut entry, removed) = {
            let mut registry = self.registry.lock();
            let entry = registry
                .entries
                .remove(id)
                .ok_or_else(|| ManagerError::NotFound { id: id.clone() })?;
            (entry, self.writer.remove(id))
        };

        if let Err(e) = removed.wait().await {
            warn!(app = %id, error = %e, "Failed to delete install record");
            // The record stays; a transfer that was running is now paused.
            let transition = self.keep_after_failed_removal(&mut entry, acknowledged);
            self.registry.lock().entries.insert(id.clone(), entry);
            if let Some(transition) = transition {
                self.announce(id, transition);
            }
            return Err(e.into());
        }

        let paths = ArchivePaths::for_app(&self.config.packages_dir(), id);
        if let Err(e) = paths.remove_all() {
            warn!(app = %id, error = %e, "Failed to delete package archive");
        }

        info!(app = %id, command = %command, "Install removed");
        self.bus.publish(InstallEvent::Removed { id: id.clone() });
        Ok(())
    }

    fn keep_after_failed_removal(
        &self,
        entry: &mut Entry,
        acknowledged: Option<u64>,
    ) -> Option<Transition> {
        if let Some(bytes) = acknowledged {
            entry.record.record_progress(bytes, None);
        }
        let transition = if entry.record.state().is_active() {
            entry.record.apply(Trigger::PauseRequested).ok()
        } else {
            None
        };
        self.persist(&entry.record);
        transition
    }

    /// Wait for the record's command gate.
    ///
    /// Fails with `NotFound` if the record is gone by the time the gate is
    /// acquired.
    async fn lock_gate(&self, id: &AppId) -> ManagerResult<OwnedMutexGuard<()>> {
        let gate = {
            let mut registry = self.registry.lock();
            Arc::clone(&registry.entry_mut(id)?.gate)
        };

        let guard = Arc::clone(&gate).lock_owned().await;

        let registry = self.registry.lock();
        match registry.entries.get(id) {
            Some(entry) if Arc::ptr_eq(&entry.gate, &gate) => Ok(guard),
            _ => Err(ManagerError::NotFound { id: id.clone() }),
        }
    }

    /// Start the transfer for `attempt` if it is still the active one.
    fn start_transfer(&self, id: &AppId, attempt: u64) {
        let mut registry = self.registry.lock();
        let Some(entry) = registry.entries.get_mut(id) else {
            return;
        };
        if entry.active_attempt != Some(attempt) {
            return;
        }

        let Some(url) = entry.record.package_url() else {
            warn!(app = %id, "Packaged app has no archive URL");
            let _ = self.transfer_tx.send(TransferEvent {
                id: id.clone(),
                attempt,
                update: TransferUpdate::Failed(FailureKind::NotFound),
            });
            return;
        };

        let request = TransferRequest {
            id: id.clone(),
            attempt,
            url: url.to_string(),
            paths: ArchivePaths::for_app(&self.config.packages_dir(), id),
            resume_offset: entry.record.bytes_transferred(),
            expected_total: entry.record.bytes_total(),
        };
        debug!(app = %id, attempt, offset = request.resume_offset, "Starting transfer");
        entry.transfer = Some(self.transfer.start(request, self.transfer_tx.clone()));
    }

    /// Hosted resume: `pending` until the manifest is fetched again.
    async fn refetch_manifest(&self, id: &AppId, manifest_url: &str) {
        let result = self.manifests.fetch(manifest_url, AppKind::Hosted).await;

        let transition = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.entries.get_mut(id) else {
                return;
            };
            let trigger = match &result {
                Ok(resolved) => {
                    entry.record.refresh_manifest(resolved);
                    Trigger::ManifestResolved
                }
                Err(e) => {
                    warn!(app = %id, error = %e, "Manifest fetch failed on resume");
                    Trigger::TransferFailed(manifest_failure(e))
                }
            };
            match entry.record.apply(trigger) {
                Ok(transition) => {
                    self.persist(&entry.record);
                    Some(transition)
                }
                Err(rejected) => {
                    warn!(app = %id, state = %rejected.state, trigger = %rejected.trigger, "Trigger rejected");
                    None
                }
            }
        };

        if let Some(transition) = transition {
            self.announce(id, transition);
        }
        if result.is_ok() {
            self.refresh_icon(id);
        }
    }

    /// Fetch the record's icon, or announce the default icon if it has none.
    fn refresh_icon(&self, id: &AppId) {
        let url = self
            .registry
            .lock()
            .entries
            .get(id)
            .and_then(|entry| entry.record.icon_url().map(str::to_string));

        match url {
            Some(url) => self.spawn_icon_fetch(id.clone(), url),
            None => {
                self.bus.publish(InstallEvent::IconUpdated {
                    id: id.clone(),
                    icon: None,
                });
            }
        }
    }

    fn spawn_icon_fetch(&self, id: AppId, url: String) {
        let icons = Arc::clone(&self.icons);
        let tx = self.icon_tx.clone();
        tokio::spawn(async move {
            let result = icons.fetch(&url).await;
            let _ = tx.send(IconOutcome { id, url, result });
        });
    }

    fn persist(&self, record: &InstallRecord) {
        self.writer.save(record);
    }

    fn announce(&self, id: &AppId, transition: Transition) {
        debug!(app = %id, previous = %transition.previous, current = %transition.current, "State changed");
        self.bus.publish(InstallEvent::StateChanged {
            id: id.clone(),
            previous: transition.previous,
            current: transition.current,
        });
    }

    // =========================================================================
    // Event pump
    // =========================================================================

    async fn pump(
        machine: Weak<Self>,
        mut transfers: mpsc::UnboundedReceiver<TransferEvent>,
        mut icons: mpsc::UnboundedReceiver<IconOutcome>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = transfers.recv() => match machine.upgrade() {
                    Some(machine) => machine.on_transfer_event(event),
                    None => break,
                },
                Some(outcome) = icons.recv() => match machine.upgrade() {
                    Some(machine) => machine.on_icon_outcome(outcome),
                    None => break,
                },
                else => break,
            }
        }
        debug!("Install event pump stopped");
    }

    fn on_transfer_event(&self, event: TransferEvent) {
        let TransferEvent { id, attempt, update } = event;

        let mut registry = self.registry.lock();
        let Some(entry) = registry.entries.get_mut(&id) else {
            debug!(app = %id, attempt, "Dropping transfer event for removed record");
            return;
        };
        if entry.active_attempt != Some(attempt) {
            debug!(app = %id, attempt, active = ?entry.active_attempt, "Dropping stale transfer event");
            return;
        }

        let transition = match update {
            TransferUpdate::Progress { bytes, total } => {
                if entry.record.record_progress(bytes, total)
                    && entry.checkpoint.should_checkpoint(Instant::now())
                {
                    debug!(app = %id, bytes, "Progress checkpoint");
                    self.persist(&entry.record);
                }
                let progress = progress_event(&entry.record);
                drop(registry);
                self.bus.publish(progress);
                return;
            }
            TransferUpdate::Complete { bytes, digest } => {
                entry.active_attempt = None;
                entry.transfer = None;
                entry.record.record_progress(bytes, Some(bytes));
                entry.record.set_package_digest(digest);
                entry.record.apply(Trigger::TransferCompleted)
            }
            TransferUpdate::Failed(kind) => {
                entry.active_attempt = None;
                entry.transfer = None;
                entry.record.apply(Trigger::TransferFailed(kind))
            }
        };
        self.persist(&entry.record);
        let progress = progress_event(&entry.record);
        let last_error = entry.record.last_error();
        drop(registry);

        self.bus.publish(progress);
        match transition {
            Ok(transition) => {
                match last_error {
                    Some(kind) => {
                        info!(app = %id, failure = %kind, state = %transition.current, "Install failed")
                    }
                    None => info!(app = %id, "Install ready"),
                }
                self.announce(&id, transition);
            }
            Err(rejected) => {
                warn!(app = %id, state = %rejected.state, trigger = %rejected.trigger, "Trigger rejected");
            }
        }
    }

    fn on_icon_outcome(&self, outcome: IconOutcome) {
        let IconOutcome { id, url, result } = outcome;

        let icon = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.entries.get_mut(&id) else {
                debug!(app = %id, "Dropping icon for removed record");
                return;
            };
            if entry.record.icon_url() != Some(url.as_str()) {
                debug!(app = %id, url = %url, "Dropping icon for outdated URL");
                return;
            }

            let icon = match result {
                Ok(data) => {
                    let fetched = CachedIcon::new(data, url, Utc::now());
                    let slot = entry.record.icon_mut();
                    if slot.accept(fetched.clone()) {
                        self.writer.save_icon(&id, &fetched);
                    }
                    slot.display()
                }
                Err(e) => {
                    warn!(app = %id, url = %url, error = %e, "Icon fetch failed");
                    entry.record.icon_mut().fail()
                }
            };
            self.persist(&entry.record);
            icon
        };

        self.bus.publish(InstallEvent::IconUpdated { id, icon });
    }
}

impl Drop for InstallStateMachine {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for entry in self.registry.get_mut().entries.values() {
            if let Some(handle) = &entry.transfer {
                handle.abort();
            }
        }
    }
}

fn invalid(id: &AppId, state: InstallState, command: Command) -> ManagerError {
    ManagerError::InvalidState {
        id: id.clone(),
        state,
        command,
    }
}

fn progress_event(record: &InstallRecord) -> InstallEvent {
    InstallEvent::Progress {
        id: record.id().clone(),
        bytes_transferred: record.bytes_transferred(),
        bytes_total: record.bytes_total(),
    }
}

/// Classify a manifest failure during a hosted resume.
fn manifest_failure(error: &ManifestError) -> FailureKind {
    error
        .status()
        .and_then(FailureKind::from_status)
        .unwrap_or(FailureKind::Network)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tempfile::TempDir;

    use crate::events::Topic;
    use crate::http::tests::{MockHttpClient, MockResponse};
    use crate::http::TransportError;
    use crate::manager::record::tests::resolved;
    use crate::manager::store::{MemoryRecordStore, StoreError};

    const MANIFEST: &str = r#"{"name":"Clock","launch_path":"/index.html"}"#;

    fn machine_with(
        client: MockHttpClient,
        store: Arc<dyn RecordStore>,
    ) -> (Arc<InstallStateMachine>, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = ManagerConfig::new(dir.path().to_path_buf());
        let machine =
            InstallStateMachine::open(config, Arc::new(client), store, NotificationBus::new())
                .unwrap();
        (machine, dir)
    }

    fn machine(client: MockHttpClient) -> (Arc<InstallStateMachine>, TempDir) {
        machine_with(client, Arc::new(MemoryRecordStore::new()))
    }

    #[tokio::test]
    async fn test_hosted_install_goes_straight_to_ready() {
        let (machine, _dir) = machine(MockHttpClient::new(Ok(MockResponse::json(MANIFEST))));
        let (_sub, mut events) = machine.bus().subscribe_channel(Topic::All);

        let record = machine.install("http://h/manifest.webapp").await.unwrap();

        assert_eq!(record.state(), InstallState::Ready);
        assert_eq!(
            events.recv().await,
            Some(InstallEvent::Added {
                id: record.id().clone(),
                kind: AppKind::Hosted,
            })
        );
        assert_eq!(
            events.recv().await,
            Some(InstallEvent::StateChanged {
                id: record.id().clone(),
                previous: InstallState::Pending,
                current: InstallState::Ready,
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_manifest_creates_no_record() {
        let (machine, _dir) = machine(MockHttpClient::new(Ok(MockResponse::json("{not json"))));

        let result = machine.install("http://h/manifest.webapp").await;

        assert!(matches!(result, Err(ManagerError::Manifest(ref e)) if e.is_parse_error()));
        assert!(machine.records().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_manifest_creates_no_record() {
        let client = MockHttpClient::new(Err(TransportError::Connect("refused".to_string())));
        let (machine, _dir) = machine(client);

        let result = machine.install("http://h/manifest.webapp").await;

        assert!(matches!(result, Err(ManagerError::Manifest(_))));
        assert!(machine.records().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_install_is_rejected() {
        let (machine, _dir) = machine(MockHttpClient::new(Ok(MockResponse::json(MANIFEST))));
        machine.install("http://h/manifest.webapp").await.unwrap();

        let result = machine.install("http://h/manifest.webapp").await;

        assert!(matches!(
            result,
            Err(ManagerError::AlreadyInstalled {
                state: InstallState::Ready,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_commands_on_unknown_app_are_rejected() {
        let (machine, _dir) = machine(MockHttpClient::new(Ok(MockResponse::json(MANIFEST))));
        let id = AppId::new("http://nowhere/manifest.webapp");

        assert!(matches!(machine.pause(&id).await, Err(ManagerError::NotFound { .. })));
        assert!(matches!(machine.resume(&id).await, Err(ManagerError::NotFound { .. })));
        assert!(matches!(machine.uninstall(&id).await, Err(ManagerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_ready_app_cannot_be_paused_resumed_or_cancelled() {
        let (machine, _dir) = machine(MockHttpClient::new(Ok(MockResponse::json(MANIFEST))));
        let id = machine
            .install("http://h/manifest.webapp")
            .await
            .unwrap()
            .id()
            .clone();

        for result in [
            machine.pause(&id).await.map(|_| ()),
            machine.resume(&id).await.map(|_| ()),
            machine.cancel(&id).await,
        ] {
            assert!(matches!(
                result,
                Err(ManagerError::InvalidState {
                    state: InstallState::Ready,
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn test_uninstall_removes_record_and_document() {
        let store = Arc::new(MemoryRecordStore::new());
        let client = MockHttpClient::new(Ok(MockResponse::json(MANIFEST)));
        let (machine, _dir) = machine_with(client, store.clone());
        let id = machine
            .install("http://h/manifest.webapp")
            .await
            .unwrap()
            .id()
            .clone();
        let (_sub, mut events) = machine.bus().subscribe_channel(Topic::App(id.clone()));

        machine.uninstall(&id).await.unwrap();

        assert!(machine.record(&id).is_none());
        assert!(store.get(&id).is_none());
        assert_eq!(events.recv().await, Some(InstallEvent::Removed { id }));
    }

    #[tokio::test]
    async fn test_open_restores_interrupted_download_as_paused() {
        let mut record = InstallRecord::new(&resolved(AppKind::Packaged, Some(100)));
        record.apply(Trigger::TransferStarted).unwrap();
        record.record_progress(40, None);
        let id = record.id().clone();
        let store = Arc::new(MemoryRecordStore::with_records([record]));

        let (machine, _dir) = machine_with(
            MockHttpClient::new(Ok(MockResponse::json(MANIFEST))),
            store.clone(),
        );

        let restored = machine.record(&id).unwrap();
        assert_eq!(restored.state(), InstallState::Paused);
        assert_eq!(restored.bytes_transferred(), 40);
        assert_eq!(store.get(&id).unwrap().state(), InstallState::Paused);
    }

    #[tokio::test]
    async fn test_hosted_resume_refetches_manifest() {
        let mut record = InstallRecord::new(&resolved(AppKind::Hosted, None));
        record.apply(Trigger::PauseRequested).unwrap();
        let id = record.id().clone();
        let store = Arc::new(MemoryRecordStore::with_records([record]));
        let (machine, _dir) = machine_with(
            MockHttpClient::new(Ok(MockResponse::json(MANIFEST))),
            store,
        );
        let (_sub, mut events) = machine.bus().subscribe_channel(Topic::App(id.clone()));

        let resumed = machine.resume(&id).await.unwrap();

        assert_eq!(resumed.state(), InstallState::Ready);
        assert_eq!(resumed.retry_count(), 1);
        assert_eq!(
            events.recv().await,
            Some(InstallEvent::StateChanged {
                id: id.clone(),
                previous: InstallState::Paused,
                current: InstallState::Pending,
            })
        );
        assert_eq!(
            events.recv().await,
            Some(InstallEvent::StateChanged {
                id,
                previous: InstallState::Pending,
                current: InstallState::Ready,
            })
        );
    }

    #[tokio::test]
    async fn test_hosted_resume_with_server_error_is_unrecoverable() {
        let mut record = InstallRecord::new(&resolved(AppKind::Hosted, None));
        record.apply(Trigger::PauseRequested).unwrap();
        let id = record.id().clone();
        let client = MockHttpClient::new(Ok(MockResponse {
            status: 503,
            content_type: None,
            body: Vec::new(),
        }));
        let (machine, _dir) =
            machine_with(client, Arc::new(MemoryRecordStore::with_records([record])));

        let resumed = machine.resume(&id).await.unwrap();

        assert_eq!(resumed.state(), InstallState::Unrecoverable);
        assert_eq!(resumed.last_error(), Some(FailureKind::ServerError));
    }

    #[test]
    fn test_manifest_failure_classification() {
        let status = |status| ManifestError::HttpStatus {
            url: "http://h/manifest.webapp".to_string(),
            status,
        };
        assert_eq!(manifest_failure(&status(500)), FailureKind::ServerError);
        assert_eq!(manifest_failure(&status(404)), FailureKind::NotFound);
        assert_eq!(
            manifest_failure(&ManifestError::Network {
                url: "http://h/manifest.webapp".to_string(),
                source: TransportError::Timeout,
            }),
            FailureKind::Network
        );
    }

    /// Memory store whose writes can be held back or made to fail.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryRecordStore,
        hold: std::sync::Mutex<()>,
        fail_removal: std::sync::atomic::AtomicBool,
    }

    impl RecordStore for SlowStore {
        fn load_all(&self) -> Result<Vec<InstallRecord>, StoreError> {
            self.inner.load_all()
        }

        fn save(&self, record: &InstallRecord) -> Result<(), StoreError> {
            let _held = self.hold.lock().unwrap();
            self.inner.save(record)
        }

        fn remove(&self, id: &AppId) -> Result<(), StoreError> {
            if self.fail_removal.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Io {
                    path: id.storage_key().into(),
                    source: std::io::Error::other("read-only"),
                });
            }
            self.inner.remove(id)
        }
    }

    #[tokio::test]
    async fn test_commands_do_not_wait_for_disk_writes() {
        let mut record = InstallRecord::new(&resolved(AppKind::Hosted, None));
        record.apply(Trigger::PauseRequested).unwrap();
        let id = record.id().clone();
        let store = Arc::new(SlowStore::default());
        store.inner.save(&record).unwrap();
        let (machine, _dir) = machine_with(
            MockHttpClient::new(Ok(MockResponse::json(MANIFEST))),
            Arc::clone(&store) as Arc<dyn RecordStore>,
        );

        let held = store.hold.lock().unwrap();
        let resumed = tokio::time::timeout(Duration::from_secs(5), machine.resume(&id))
            .await
            .expect("resume blocked on a pending write")
            .unwrap();
        assert_eq!(resumed.state(), InstallState::Ready);
        assert_eq!(machine.record(&id).unwrap().state(), InstallState::Ready);
        assert_eq!(store.inner.get(&id).unwrap().state(), InstallState::Paused);

        drop(held);
        machine.flush().await.unwrap();
        assert_eq!(store.inner.get(&id).unwrap().state(), InstallState::Ready);
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_record() {
        let store = Arc::new(SlowStore::default());
        let (machine, _dir) = machine_with(
            MockHttpClient::new(Ok(MockResponse::json(MANIFEST))),
            Arc::clone(&store) as Arc<dyn RecordStore>,
        );
        let id = machine
            .install("http://h/manifest.webapp")
            .await
            .unwrap()
            .id()
            .clone();
        store
            .fail_removal
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let result = machine.uninstall(&id).await;

        assert!(matches!(result, Err(ManagerError::Store(StoreError::Io { .. }))));
        assert_eq!(machine.record(&id).unwrap().state(), InstallState::Ready);
        machine.flush().await.unwrap();
        assert!(store.inner.get(&id).is_some());
    }
}
