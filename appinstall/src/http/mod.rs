//! HTTP client abstraction for testability.
//!
//! The install lifecycle never talks to `reqwest` directly. Everything that
//! leaves the process goes through [`HttpClient`], which lets the state machine
//! be driven by a scripted server in tests and by [`ReqwestClient`] in
//! production.

mod client;
mod error;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

pub use client::{ReqwestClient, DEFAULT_CONNECT_TIMEOUT_SECS};
pub use error::TransportError;

/// Boxed future returned by [`HttpClient`] so the trait stays dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body as a stream of chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Status line, the headers the lifecycle cares about, and a streaming body.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Value of the `Content-Length` header, if any.
    pub content_length: Option<u64>,
    /// Response body.
    pub body: ByteStream,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Media type of the response without parameters, lowercased.
    ///
    /// `application/json; charset=utf-8` becomes `application/json`.
    pub fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Collect the whole body, failing once more than `limit` bytes arrive.
    pub async fn read_to_end(mut self, limit: usize) -> Result<Bytes, TransportError> {
        if let Some(length) = self.content_length {
            if length > limit as u64 {
                return Err(TransportError::BodyTooLarge { limit });
            }
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk?;
            if buffer.len() + chunk.len() > limit {
                return Err(TransportError::BodyTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling scripted HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    /// * `range_start` - Byte offset to resume from; `None` or `Some(0)` requests
    ///   the whole resource
    ///
    /// Non-2xx statuses are returned as responses, not errors. Only transport
    /// failures (connect, timeout, malformed URL) surface as `Err`.
    fn get(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}
