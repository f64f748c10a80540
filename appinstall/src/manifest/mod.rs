//! Application manifests.
//!
//! A hosted app is described by a full manifest served at a well-known path.
//! A packaged app is described by a package manifest ("mini-manifest") that
//! additionally declares where the archive lives and how large it is.
//!
//! [`ManifestFetcher`] downloads and validates either kind before any install
//! record exists, so a malformed manifest rejects the install request
//! synchronously.

mod error;
mod fetcher;
mod types;

pub use error::ManifestError;
pub use fetcher::{ManifestFetcher, ResolvedManifest, DEFAULT_MAX_MANIFEST_BYTES};
pub use types::{AppKind, Developer, Manifest};
