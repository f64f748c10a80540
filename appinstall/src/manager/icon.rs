//! Icon sub-state.
//!
//! The icon is fetched alongside the install and fails independently of it.
//! Each record keeps an [`IconSlot`]: a single-entry cache that is only ever
//! replaced by a strictly newer successful fetch, plus a flag asking for a
//! one-shot refresh once connectivity returns.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::record::AppId;
use crate::http::{HttpClient, TransportError};

/// Upper bound for icon downloads (512 KiB).
pub const DEFAULT_MAX_ICON_BYTES: usize = 512 * 1024;

/// Why an icon could not be refreshed. Never surfaced to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IconFetchError {
    #[error("icon request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("icon request returned HTTP {0}")]
    Status(u16),

    #[error("icon has non-image content type {0:?}")]
    NotAnImage(String),
}

/// A successfully fetched icon.
///
/// Only the metadata is serialized with the record. Stores keep the image
/// bytes on their own so that a progress checkpoint never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedIcon {
    #[serde(skip)]
    data: Bytes,
    source_url: String,
    fetched_at: DateTime<Utc>,
}

impl CachedIcon {
    pub fn new(
        data: impl Into<Bytes>,
        source_url: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data: data.into(),
            source_url: source_url.into(),
            fetched_at,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Single-entry icon cache attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconSlot {
    cached: Option<CachedIcon>,
    needs_refresh: bool,
}

impl IconSlot {
    pub fn cached(&self) -> Option<&CachedIcon> {
        self.cached.as_ref()
    }

    /// Whether the last fetch failed and a refresh is wanted.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Offer a freshly fetched icon.
    ///
    /// The cached icon is replaced only when `icon` is strictly newer.
    /// Returns whether it was stored.
    pub fn accept(&mut self, icon: CachedIcon) -> bool {
        self.needs_refresh = false;
        let newer = self
            .cached
            .as_ref()
            .map_or(true, |current| icon.fetched_at > current.fetched_at);
        if newer {
            self.cached = Some(icon);
        }
        newer
    }

    /// Note a failed fetch and return the icon to show instead.
    ///
    /// `None` means the launcher falls back to its default icon. The cached
    /// icon is kept.
    pub fn fail(&mut self) -> Option<Bytes> {
        self.needs_refresh = true;
        self.display()
    }

    /// Icon to show right now; `None` for the default icon.
    pub fn display(&self) -> Option<Bytes> {
        self.cached.as_ref().map(|icon| icon.data.clone())
    }

    /// Consume the refresh request. Returns whether one was pending.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.needs_refresh)
    }

    /// Reattach image bytes after the record was loaded from a store.
    ///
    /// `None` means the bytes were lost: the cache is dropped and a refresh
    /// is requested.
    pub(crate) fn restore(&mut self, data: Option<Bytes>) {
        match (data, self.cached.as_mut()) {
            (Some(data), Some(icon)) => icon.data = data,
            (None, Some(_)) => {
                self.cached = None;
                self.needs_refresh = true;
            }
            (_, None) => {}
        }
    }
}

/// Result of a background icon fetch, delivered to the state machine.
#[derive(Debug)]
pub(crate) struct IconOutcome {
    pub id: AppId,
    pub url: String,
    pub result: Result<Bytes, IconFetchError>,
}

/// Downloads icon images.
pub struct IconFetcher {
    client: Arc<dyn HttpClient>,
    max_bytes: usize,
}

impl IconFetcher {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            max_bytes: DEFAULT_MAX_ICON_BYTES,
        }
    }

    /// Set the maximum accepted icon size.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Fetch the icon at `url`.
    ///
    /// A response without a content type is accepted; one that declares a
    /// non-image type is not.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, IconFetchError> {
        let response = self.client.get(url, None).await?;

        if !response.is_success() {
            return Err(IconFetchError::Status(response.status));
        }

        if let Some(media_type) = response.media_type() {
            if !media_type.starts_with("image/") {
                return Err(IconFetchError::NotAnImage(media_type));
            }
        }

        Ok(response.read_to_end(self.max_bytes).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{MockHttpClient, MockResponse};

    use chrono::Duration;

    fn icon(data: &[u8], at: DateTime<Utc>) -> CachedIcon {
        CachedIcon::new(data.to_vec(), "http://h/icon.png", at)
    }

    #[test]
    fn test_empty_slot_falls_back_to_default() {
        let mut slot = IconSlot::default();
        assert_eq!(slot.fail(), None);
        assert!(slot.needs_refresh());
    }

    #[test]
    fn test_failure_prefers_cached_icon() {
        let mut slot = IconSlot::default();
        slot.accept(icon(b"png", Utc::now()));

        let shown = slot.fail();

        assert_eq!(shown.as_deref(), Some(&b"png"[..]));
        assert!(slot.cached().is_some());
    }

    #[test]
    fn test_only_strictly_newer_icon_replaces_cache() {
        let now = Utc::now();
        let mut slot = IconSlot::default();

        assert!(slot.accept(icon(b"first", now)));
        assert!(!slot.accept(icon(b"same-time", now)));
        assert!(!slot.accept(icon(b"older", now - Duration::seconds(5))));
        assert_eq!(slot.cached().unwrap().data(), b"first");

        assert!(slot.accept(icon(b"newer", now + Duration::seconds(5))));
        assert_eq!(slot.cached().unwrap().data(), b"newer");
    }

    #[test]
    fn test_icon_bytes_are_not_serialized() {
        let mut slot = IconSlot::default();
        slot.accept(icon(b"png-bytes", Utc::now()));

        let json = serde_json::to_string(&slot).unwrap();
        assert!(json.contains("sourceUrl"));
        assert!(!json.contains("data"));

        let mut loaded: IconSlot = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.display().as_deref(), Some(&b""[..]));
        loaded.restore(Some(Bytes::from_static(b"png-bytes")));
        assert_eq!(loaded, slot);
    }

    #[test]
    fn test_restore_without_bytes_drops_cache() {
        let mut slot = IconSlot::default();
        slot.accept(icon(b"png", Utc::now()));

        slot.restore(None);

        assert!(slot.cached().is_none());
        assert!(slot.needs_refresh());
    }

    #[test]
    fn test_take_refresh_is_one_shot() {
        let mut slot = IconSlot::default();
        slot.fail();

        assert!(slot.take_refresh());
        assert!(!slot.take_refresh());
    }

    #[tokio::test]
    async fn test_fetcher_returns_image_bytes() {
        let client = MockHttpClient::new(Ok(MockResponse {
            status: 200,
            content_type: Some("image/png".to_string()),
            body: b"\x89PNG".to_vec(),
        }));
        let fetcher = IconFetcher::new(Arc::new(client));

        let bytes = fetcher.fetch("http://h/icon.png").await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn test_fetcher_rejects_non_image() {
        let client = MockHttpClient::new(Ok(MockResponse::json("{}")));
        let fetcher = IconFetcher::new(Arc::new(client));

        let err = fetcher.fetch("http://h/icon.png").await.unwrap_err();
        assert!(matches!(err, IconFetchError::NotAnImage(_)));
    }

    #[tokio::test]
    async fn test_fetcher_reports_status() {
        let client = MockHttpClient::new(Ok(MockResponse {
            status: 404,
            content_type: None,
            body: Vec::new(),
        }));
        let fetcher = IconFetcher::new(Arc::new(client));

        let err = fetcher.fetch("http://h/icon.png").await.unwrap_err();
        assert_eq!(err, IconFetchError::Status(404));
    }
}
