use bytes::Bytes;

use crate::manager::{AppId, InstallState};
use crate::manifest::AppKind;

/// Event published by the install state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// An install request was accepted and a record created in `pending`.
    Added { id: AppId, kind: AppKind },

    /// The record moved between lifecycle states.
    StateChanged {
        id: AppId,
        previous: InstallState,
        current: InstallState,
    },

    /// Bytes of the package archive received so far.
    Progress {
        id: AppId,
        bytes_transferred: u64,
        bytes_total: Option<u64>,
    },

    /// Icon to display. `None` means "use the default icon".
    IconUpdated { id: AppId, icon: Option<Bytes> },

    /// The record was deleted by uninstall or cancel.
    Removed { id: AppId },
}

impl InstallEvent {
    /// Application the event is about.
    pub fn id(&self) -> &AppId {
        match self {
            Self::Added { id, .. }
            | Self::StateChanged { id, .. }
            | Self::Progress { id, .. }
            | Self::IconUpdated { id, .. }
            | Self::Removed { id } => id,
        }
    }

    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::StateChanged { .. } => "stateChanged",
            Self::Progress { .. } => "progress",
            Self::IconUpdated { .. } => "iconUpdated",
            Self::Removed { .. } => "removed",
        }
    }
}
