//! Lifecycle transition table.
//!
//! Every state change of an [`InstallRecord`](super::InstallRecord) goes
//! through [`next_state`]. Keeping the table in one pure function makes the
//! lifecycle rules testable without any I/O.

use std::fmt;

use super::record::{FailureKind, InstallState};
use crate::manifest::AppKind;

/// Something that happened to an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The manifest was fetched and validated.
    ManifestResolved,
    /// A package transfer was issued.
    TransferStarted,
    /// The package transfer delivered the whole archive.
    TransferCompleted,
    /// The user paused the install.
    PauseRequested,
    /// The transfer (or manifest re-fetch) failed.
    TransferFailed(FailureKind),
    /// The user asked to retry.
    ResumeRequested,
    /// The process stopped while work was in flight.
    Interrupted,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::ManifestResolved => f.write_str("manifest resolved"),
            Trigger::TransferStarted => f.write_str("transfer started"),
            Trigger::TransferCompleted => f.write_str("transfer completed"),
            Trigger::PauseRequested => f.write_str("pause requested"),
            Trigger::TransferFailed(kind) => write!(f, "transfer failed ({})", kind),
            Trigger::ResumeRequested => f.write_str("resume requested"),
            Trigger::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// An accepted state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: InstallState,
    pub current: InstallState,
}

/// A trigger the current state does not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedTrigger {
    pub state: InstallState,
    pub trigger: Trigger,
}

/// Compute the state reached from `current` on `trigger`.
///
/// Returns `None` when the trigger is not accepted in `current`.
/// `unrecoverable` and `ready` accept nothing; only deletion leaves them.
pub fn next_state(kind: AppKind, current: InstallState, trigger: Trigger) -> Option<InstallState> {
    use InstallState::*;

    match (current, trigger) {
        // Hosted apps have no archive: a valid manifest is the whole install.
        (Pending, Trigger::ManifestResolved) if kind == AppKind::Hosted => Some(Ready),
        (Pending, Trigger::TransferStarted) if kind == AppKind::Packaged => Some(Downloading),
        (Downloading, Trigger::TransferCompleted) => Some(Ready),
        (Pending | Downloading, Trigger::PauseRequested) => Some(Paused),
        (Pending | Downloading, Trigger::TransferFailed(failure)) => Some(failure.target_state()),
        (Paused | Error, Trigger::ResumeRequested) => Some(match kind {
            AppKind::Packaged => Downloading,
            AppKind::Hosted => Pending,
        }),
        (Pending | Downloading, Trigger::Interrupted) => Some(Paused),
        _ => None,
    }
}
