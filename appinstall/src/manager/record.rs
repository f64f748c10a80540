//! Persisted install records.
//!
//! One [`InstallRecord`] exists per application whose install request was
//! accepted. Records are owned by the state machine: callers only ever see
//! clones, and the lifecycle fields can only change through
//! [`InstallRecord::apply`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::icon::IconSlot;
use super::transition::{next_state, RejectedTrigger, Transition, Trigger};
use crate::manifest::{AppKind, ResolvedManifest};

/// Stable application identity.
///
/// Derived from the manifest URL for hosted apps and from the package
/// manifest URL for packaged apps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    /// Wrap a manifest URL.
    pub fn new(manifest_url: impl Into<String>) -> Self {
        Self(manifest_url.into())
    }

    /// The manifest URL this identity is derived from.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe key (lowercase hex SHA-256 of the identity).
    pub fn storage_key(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle state of an install record.
///
/// ```text
/// pending ──► downloading ──► ready
///    │            │  ├──► paused ──┐
///    │            │  ├──► error ───┤ resume
///    │            │  └──► unrecoverable (uninstall only)
///    │            ◄────────────────┘
///    └──► ready (hosted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    /// Manifest work in flight.
    Pending,
    /// Package archive transfer in flight.
    Downloading,
    /// Transfer stopped by the user; resumable.
    Paused,
    /// Installed and launchable.
    Ready,
    /// Transient failure; resumable.
    Error,
    /// Server-side failure; the record must be uninstalled.
    Unrecoverable,
}

impl InstallState {
    /// Get a lowercase name for the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Unrecoverable => "unrecoverable",
        }
    }

    /// Whether work is in flight for the record.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Downloading)
    }

    /// Whether an explicit resume is accepted.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Paused | Self::Error)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classified transfer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Connection reset, timeout, truncated body, or an unexpected status.
    Network,
    /// HTTP 5xx: the server cannot serve the resource.
    ServerError,
    /// HTTP 404/410.
    NotFound,
    /// The archive could not be written locally.
    Storage,
}

impl FailureKind {
    /// Classify an HTTP status. Returns `None` for 2xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            404 | 410 => Some(Self::NotFound),
            500..=599 => Some(Self::ServerError),
            _ => Some(Self::Network),
        }
    }

    /// Whether an explicit resume may retry after this failure.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::ServerError)
    }

    /// State a record enters when its transfer fails this way.
    pub fn target_state(self) -> InstallState {
        if self.is_recoverable() {
            InstallState::Error
        } else {
            InstallState::Unrecoverable
        }
    }

    /// Localization key for the user-facing message.
    pub fn message_key(self) -> &'static str {
        match self {
            Self::Network | Self::NotFound => "download-failed",
            Self::ServerError => "install-failed",
            Self::Storage => "not-enough-space",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::ServerError => "serverError",
            Self::NotFound => "notFound",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Action a launcher offers when the user activates the app's icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    /// Start the app.
    Launch,
    /// Offer to cancel the in-flight install.
    CancelDownload,
    /// Offer to resume the download.
    Resume,
    /// Offer only removal.
    Uninstall,
}

/// One application's installation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    id: AppId,
    kind: AppKind,
    name: String,
    manifest_url: String,
    package_url: Option<String>,
    icon_url: Option<String>,
    state: InstallState,
    bytes_transferred: u64,
    bytes_total: Option<u64>,
    retry_count: u32,
    last_error: Option<FailureKind>,
    #[serde(default)]
    icon: IconSlot,
    package_digest: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InstallRecord {
    /// Create a `pending` record for an accepted install request.
    pub fn new(resolved: &ResolvedManifest) -> Self {
        let now = Utc::now();
        Self {
            id: AppId::new(resolved.manifest_url.clone()),
            kind: resolved.kind,
            name: resolved.manifest.name.clone(),
            manifest_url: resolved.manifest_url.clone(),
            package_url: resolved.package_url.clone(),
            icon_url: resolved.icon_url.clone(),
            state: InstallState::Pending,
            bytes_transferred: 0,
            bytes_total: resolved.manifest.size,
            retry_count: 0,
            last_error: None,
            icon: IconSlot::default(),
            package_digest: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &AppId {
        &self.id
    }

    pub fn kind(&self) -> AppKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    pub fn package_url(&self) -> Option<&str> {
        self.package_url.as_deref()
    }

    pub fn icon_url(&self) -> Option<&str> {
        self.icon_url.as_deref()
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Bytes of the archive durably received; the resume offset.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Archive size, once known.
    pub fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }

    /// Number of explicit resumes. Informational only.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<FailureKind> {
        self.last_error
    }

    pub fn icon(&self) -> &IconSlot {
        &self.icon
    }

    /// SHA-256 of the completed archive.
    pub fn package_digest(&self) -> Option<&str> {
        self.package_digest.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Action offered when the icon is activated.
    pub fn affordance(&self) -> Affordance {
        match self.state {
            InstallState::Ready => Affordance::Launch,
            InstallState::Pending | InstallState::Downloading => Affordance::CancelDownload,
            InstallState::Paused | InstallState::Error => Affordance::Resume,
            InstallState::Unrecoverable => Affordance::Uninstall,
        }
    }

    /// Download progress as a ratio (0.0 to 1.0), if the total is known.
    pub fn progress_ratio(&self) -> Option<f64> {
        match self.bytes_total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_transferred as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    /// Drive the lifecycle with a trigger.
    ///
    /// Failures set `last_error`; every other accepted transition clears it.
    /// A resume bumps `retry_count`.
    pub fn apply(&mut self, trigger: Trigger) -> Result<Transition, RejectedTrigger> {
        let previous = self.state;
        let Some(current) = next_state(self.kind, previous, trigger) else {
            return Err(RejectedTrigger {
                state: previous,
                trigger,
            });
        };

        self.state = current;
        match trigger {
            Trigger::TransferFailed(kind) => self.last_error = Some(kind),
            Trigger::ResumeRequested => {
                self.retry_count = self.retry_count.saturating_add(1);
                self.last_error = None;
            }
            _ => self.last_error = None,
        }
        self.touch();

        Ok(Transition { previous, current })
    }

    /// Record progress reported by the active transfer.
    ///
    /// The offset never moves backwards. Returns whether anything changed.
    pub fn record_progress(&mut self, bytes: u64, total: Option<u64>) -> bool {
        let mut changed = false;
        if bytes > self.bytes_transferred {
            self.bytes_transferred = bytes;
            changed = true;
        }
        if total.is_some() && total != self.bytes_total {
            self.bytes_total = total;
            changed = true;
        }
        if changed {
            self.touch();
        }
        changed
    }

    /// Store the archive digest once the transfer completed.
    pub fn set_package_digest(&mut self, digest: String) {
        self.package_digest = Some(digest);
        self.touch();
    }

    /// Refresh identity data after the manifest was fetched again.
    pub fn refresh_manifest(&mut self, resolved: &ResolvedManifest) {
        self.name = resolved.manifest.name.clone();
        self.icon_url = resolved.icon_url.clone();
        self.touch();
    }

    pub(crate) fn icon_mut(&mut self) -> &mut IconSlot {
        &mut self.icon
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::manifest::Manifest;

    pub(crate) fn resolved(kind: AppKind, size: Option<u64>) -> ResolvedManifest {
        ResolvedManifest {
            kind,
            manifest_url: "http://h/manifest.webapp".to_string(),
            manifest: Manifest {
                name: "Clock".to_string(),
                size,
                ..Default::default()
            },
            package_url: (kind == AppKind::Packaged).then(|| "http://h/clock.zip".to_string()),
            icon_url: Some("http://h/icon.png".to_string()),
        }
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = InstallRecord::new(&resolved(AppKind::Packaged, Some(2048)));

        assert_eq!(record.state(), InstallState::Pending);
        assert_eq!(record.id().as_str(), "http://h/manifest.webapp");
        assert_eq!(record.bytes_total(), Some(2048));
        assert_eq!(record.bytes_transferred(), 0);
        assert_eq!(record.affordance(), Affordance::CancelDownload);
    }

    #[test]
    fn test_apply_failure_sets_last_error() {
        let mut record = InstallRecord::new(&resolved(AppKind::Packaged, None));
        record.apply(Trigger::TransferStarted).unwrap();

        let transition = record
            .apply(Trigger::TransferFailed(FailureKind::Network))
            .unwrap();

        assert_eq!(transition.previous, InstallState::Downloading);
        assert_eq!(transition.current, InstallState::Error);
        assert_eq!(record.last_error(), Some(FailureKind::Network));
        assert_eq!(record.affordance(), Affordance::Resume);
    }

    #[test]
    fn test_resume_clears_error_and_counts_retry() {
        let mut record = InstallRecord::new(&resolved(AppKind::Packaged, None));
        record.apply(Trigger::TransferStarted).unwrap();
        record
            .apply(Trigger::TransferFailed(FailureKind::Network))
            .unwrap();

        record.apply(Trigger::ResumeRequested).unwrap();

        assert_eq!(record.state(), InstallState::Downloading);
        assert_eq!(record.retry_count(), 1);
        assert_eq!(record.last_error(), None);
    }

    #[test]
    fn test_rejected_trigger_leaves_state_untouched() {
        let mut record = InstallRecord::new(&resolved(AppKind::Packaged, None));
        record.apply(Trigger::TransferStarted).unwrap();
        record
            .apply(Trigger::TransferFailed(FailureKind::ServerError))
            .unwrap();

        assert!(record.apply(Trigger::ResumeRequested).is_err());
        assert_eq!(record.state(), InstallState::Unrecoverable);
        assert_eq!(record.retry_count(), 0);
        assert_eq!(record.affordance(), Affordance::Uninstall);
    }

    #[test]
    fn test_record_progress_is_monotonic() {
        let mut record = InstallRecord::new(&resolved(AppKind::Packaged, None));

        assert!(record.record_progress(100, Some(1000)));
        assert!(!record.record_progress(50, Some(1000)));
        assert_eq!(record.bytes_transferred(), 100);
        assert_eq!(record.progress_ratio(), Some(0.1));
    }

    #[test]
    fn test_storage_key_is_stable_hex() {
        let id = AppId::new("http://h/manifest.webapp");
        let key = id.storage_key();
        assert_eq!(key.len(), 64);
        assert_eq!(key, AppId::new("http://h/manifest.webapp").storage_key());
        assert_ne!(key, AppId::new("http://h/other.webapp").storage_key());
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(FailureKind::from_status(200), None);
        assert_eq!(FailureKind::from_status(206), None);
        assert_eq!(FailureKind::from_status(404), Some(FailureKind::NotFound));
        assert_eq!(FailureKind::from_status(500), Some(FailureKind::ServerError));
        assert_eq!(FailureKind::from_status(503), Some(FailureKind::ServerError));
        assert_eq!(FailureKind::from_status(403), Some(FailureKind::Network));
        assert_eq!(FailureKind::ServerError.message_key(), "install-failed");
        assert_eq!(FailureKind::Storage.message_key(), "not-enough-space");
    }

    #[test]
    fn test_record_serde_round_trip_uses_camel_case() {
        let record = InstallRecord::new(&resolved(AppKind::Hosted, None));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"manifestUrl\""));
        assert!(json.contains("\"state\":\"pending\""));

        let parsed: InstallRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
