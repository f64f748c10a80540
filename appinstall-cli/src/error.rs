//! CLI error type.

use std::fmt;

use appinstall::config::ConfigError;
use appinstall::logging::LoggingError;
use appinstall::manager::ManagerError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration problem, with a message for the user.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The install manager rejected a command.
    Manager(ManagerError),
    /// The async runtime could not be started.
    Runtime(std::io::Error),
    /// Interactive prompt failed.
    Prompt(String),
    /// The Ctrl+C handler could not be installed.
    Signal(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Manager(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "failed to start runtime: {}", e),
            CliError::Prompt(msg) => write!(f, "prompt failed: {}", msg),
            CliError::Signal(msg) => write!(f, "failed to set signal handler: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Manager(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Config(_) | CliError::Prompt(_) | CliError::Signal(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<ManagerError> for CliError {
    fn from(e: ManagerError) -> Self {
        CliError::Manager(e)
    }
}
