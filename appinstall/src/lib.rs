//! AppInstall - application install and download lifecycle
//!
//! This library installs launcher applications from their manifests. Hosted
//! apps only need a valid manifest; packaged apps additionally stream a binary
//! archive over HTTP with pause, resume and failure classification. Every
//! application is tracked by a persisted [`manager::InstallRecord`] whose
//! state drives icon presentation in a launcher UI.
//!
//! # Architecture
//!
//! ```text
//! launcher UI ──commands──► InstallStateMachine ──events──► NotificationBus ──► UI
//!                               │        ▲
//!                 ManifestFetcher│        │TransferEvent / IconOutcome
//!                               ▼        │
//!                          HttpClient ◄── Transfer
//! ```

pub mod config;
pub mod events;
pub mod http;
pub mod logging;
pub mod manager;
pub mod manifest;

/// Library version, stamped into logs at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
