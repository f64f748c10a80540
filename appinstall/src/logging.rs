//! Logging setup.
//!
//! Library code only emits `tracing` events. Binaries call [`init_logging`]
//! once at startup to route them to a log file.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("failed to install log subscriber: {0}")]
    Init(String),
}

/// Route `tracing` output to `log_file`.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `default_level`. The returned guard flushes buffered lines when dropped
/// and must be held for the life of the process.
pub fn init_logging(log_file: &Path, default_level: &str) -> Result<WorkerGuard, LoggingError> {
    let dir = log_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let file_name = log_file
        .file_name()
        .unwrap_or_else(|| OsStr::new("appinstall.log"));
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(default_level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(LocalTime::rfc_3339()),
        )
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::info!(version = crate::VERSION, file = %log_file.display(), "Logging initialized");
    Ok(guard)
}

fn default_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level).map_err(|e| LoggingError::Filter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter() {
        assert!(default_filter("debug").is_ok());
        assert!(default_filter("appinstall=trace,warn").is_ok());
        assert!(matches!(
            default_filter("appinstall=loud"),
            Err(LoggingError::Filter { .. })
        ));
    }

    #[test]
    fn test_init_logging_writes_to_file() {
        let temp = TempDir::new().unwrap();
        let log_file = temp.path().join("logs").join("test.log");

        let guard = init_logging(&log_file, "info").unwrap();
        tracing::warn!("written to the log file");
        drop(guard);

        let contents = fs::read_to_string(&log_file).unwrap();
        assert!(contents.contains("written to the log file"));
    }
}
