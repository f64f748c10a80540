//! Error types for the install manager.

use std::fmt;

use thiserror::Error;

use super::record::{AppId, InstallState};
use super::store::StoreError;
use crate::http::TransportError;
use crate::manifest::ManifestError;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Inbound command names, for rejection messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Install,
    Pause,
    Resume,
    Cancel,
    Uninstall,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Install => "install",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Cancel => "cancel",
            Command::Uninstall => "uninstall",
        };
        f.write_str(name)
    }
}

/// Errors returned synchronously from the command surface.
///
/// Transfer and icon failures never appear here; they are recorded on the
/// install record and broadcast as events.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The manifest could not be fetched or is malformed; no record exists.
    #[error("install request rejected: {0}")]
    Manifest(#[from] ManifestError),

    /// No record exists for the application.
    #[error("no install record for {id}")]
    NotFound { id: AppId },

    /// A record already exists for the application.
    #[error("{id} is already installed ({state})")]
    AlreadyInstalled { id: AppId, state: InstallState },

    /// The command is not accepted in the record's current state.
    #[error("cannot {command} {id} while {state}")]
    InvalidState {
        id: AppId,
        state: InstallState,
        command: Command,
    },

    /// Persisting records failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The HTTP client could not be created.
    #[error("HTTP client error: {0}")]
    Http(#[from] TransportError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
