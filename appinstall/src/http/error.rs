//! Transport-level failures.

use thiserror::Error;

/// Errors raised below the HTTP status line: the request never produced a
/// response, or the body stream broke while it was being read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not build the client or connect to the origin.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request or body read timed out.
    #[error("request timed out")]
    Timeout,

    /// The connection dropped while the body was streaming.
    #[error("body read failed: {0}")]
    Body(String),

    /// The URL could not be used to build a request.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The body exceeded the caller's size limit.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl TransportError {
    /// Classify a `reqwest` error.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_builder() {
            Self::InvalidUrl(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::Connect(error.to_string())
        } else {
            Self::Body(error.to_string())
        }
    }
}
