//! `reqwest`-backed [`HttpClient`].

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::{CONTENT_TYPE, RANGE};

use super::{BoxFuture, HttpClient, HttpResponse, TransportError};

/// Default connect timeout in seconds.
///
/// Only connection setup is bounded here. Body reads are bounded by the
/// transfer's stall timeout so long downloads are not cut off.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }

    /// Creates a new ReqwestClient with a custom connect timeout.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("appinstall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            connect_timeout,
        })
    }

    /// Connect timeout this client was built with.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl HttpClient for ReqwestClient {
    fn get(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let mut request = self.client.get(url);
        if let Some(start) = range_start.filter(|start| *start > 0) {
            request = request.header(RANGE, format!("bytes={}-", start));
        }

        Box::pin(async move {
            let response = request.send().await.map_err(TransportError::from_reqwest)?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let content_length = response.content_length();
            let body = response
                .bytes_stream()
                .map_err(TransportError::from_reqwest);

            Ok(HttpResponse {
                status,
                content_type,
                content_length,
                body: Box::pin(body),
            })
        })
    }
}
