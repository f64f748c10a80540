//! Manifest fetch and validation errors.

use thiserror::Error;

use crate::http::TransportError;

/// Reasons a manifest could not be turned into an install request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// The manifest URL (or a path inside the manifest) is not a usable URL.
    #[error("invalid manifest URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The request never produced a response.
    #[error("failed to fetch manifest from {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: TransportError,
    },

    /// The origin answered with a non-success status.
    #[error("manifest request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The response is not declared as JSON.
    #[error("manifest at {url} has unsupported content type {content_type:?}")]
    ContentType {
        url: String,
        content_type: Option<String>,
    },

    /// The body is not a well-formed manifest document.
    #[error("failed to parse manifest from {url}: {reason}")]
    Parse { url: String, reason: String },

    /// The document parsed but is missing data the install needs.
    #[error("manifest from {url} is invalid: {reason}")]
    Invalid { url: String, reason: String },
}

impl ManifestError {
    /// Whether the failure is about the manifest's content rather than
    /// reaching the server.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. }
                | Self::ContentType { .. }
                | Self::Parse { .. }
                | Self::Invalid { .. }
        )
    }

    /// HTTP status of the failed request, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
