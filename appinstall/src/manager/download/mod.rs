//! HTTP transfer of package archives.
//!
//! This module provides the pieces the state machine uses to move an archive
//! from the origin server to disk:
//! - A single cancellable, resumable transfer (`transfer`)
//! - Staging paths for partial and completed archives (`staging`)
//! - SHA-256 digests of completed archives (`checksum`)
//! - Progress checkpoint throttling and size formatting (`progress`)
//!
//! # Architecture
//!
//! ```text
//! InstallStateMachine
//!         │ start(TransferRequest)          ▲ TransferEvent { id, attempt, update }
//!         ▼                                 │
//!     Transfer ──spawn──► transfer task ────┘
//!         │                    │
//!   TransferHandle        HttpClient (Range: bytes=<offset>-)
//!   (abort / ack)              │
//!                         <packages>/<key>.part
//! ```
//!
//! Every event carries the attempt number it belongs to. The state machine
//! drops events whose attempt is no longer the active one for the record,
//! or whose record no longer exists.

mod checksum;
mod progress;
mod staging;
mod transfer;

pub use checksum::calculate_file_checksum;
pub use progress::{format_bytes, CheckpointThrottle};
pub use staging::ArchivePaths;
pub use transfer::{
    Transfer, TransferEvent, TransferHandle, TransferRequest, TransferUpdate,
};
