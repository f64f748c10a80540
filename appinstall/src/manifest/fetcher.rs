//! Manifest download and validation.

use std::sync::Arc;

use reqwest::Url;

use super::error::ManifestError;
use super::types::{AppKind, Manifest};
use crate::http::{HttpClient, TransportError};

/// Upper bound for manifest documents (1 MiB).
pub const DEFAULT_MAX_MANIFEST_BYTES: usize = 1024 * 1024;

/// Media types accepted without a `+json` suffix.
const JSON_MEDIA_TYPES: &[&str] = &[
    "application/x-web-app-manifest+json",
    "application/json",
    "text/json",
];

/// A validated manifest together with its absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedManifest {
    /// Kind the manifest was validated for.
    pub kind: AppKind,
    /// Normalized manifest URL; the app's identity derives from it.
    pub manifest_url: String,
    /// Parsed document.
    pub manifest: Manifest,
    /// Absolute archive URL (packaged apps only).
    pub package_url: Option<String>,
    /// Absolute URL of the largest declared icon.
    pub icon_url: Option<String>,
}

/// Fetches manifests and rejects anything that is not a well-formed manifest.
pub struct ManifestFetcher {
    client: Arc<dyn HttpClient>,
    max_bytes: usize,
}

impl ManifestFetcher {
    /// Create a fetcher with the default size limit.
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            max_bytes: DEFAULT_MAX_MANIFEST_BYTES,
        }
    }

    /// Set the maximum accepted manifest size.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Fetch, parse and validate the manifest at `manifest_url`.
    ///
    /// The content type is checked before the body is parsed. A partially
    /// valid document is never returned.
    pub async fn fetch(
        &self,
        manifest_url: &str,
        kind: AppKind,
    ) -> Result<ResolvedManifest, ManifestError> {
        let base = parse_http_url(manifest_url)?;
        let url = base.to_string();

        let response = self
            .client
            .get(&url, None)
            .await
            .map_err(|source| ManifestError::Network {
                url: url.clone(),
                source,
            })?;

        if !response.is_success() {
            return Err(ManifestError::HttpStatus {
                url,
                status: response.status,
            });
        }

        let media_type = response.media_type();
        if !media_type.as_deref().is_some_and(is_json_media_type) {
            return Err(ManifestError::ContentType {
                url,
                content_type: response.content_type.clone(),
            });
        }

        let body = response
            .read_to_end(self.max_bytes)
            .await
            .map_err(|source| match source {
                TransportError::BodyTooLarge { limit } => ManifestError::Parse {
                    url: url.clone(),
                    reason: format!("manifest exceeds {} bytes", limit),
                },
                source => ManifestError::Network {
                    url: url.clone(),
                    source,
                },
            })?;

        let manifest: Manifest =
            serde_json::from_slice(&body).map_err(|e| ManifestError::Parse {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        manifest
            .validate(kind)
            .map_err(|reason| ManifestError::Invalid {
                url: url.clone(),
                reason,
            })?;

        let package_url = match (kind, manifest.package_path.as_deref()) {
            (AppKind::Packaged, Some(path)) => Some(resolve(&base, path)?),
            _ => None,
        };
        let icon_url = manifest
            .largest_icon()
            .map(|path| resolve(&base, path))
            .transpose()?;

        tracing::debug!(url = %url, kind = %kind, name = %manifest.name, "Manifest resolved");

        Ok(ResolvedManifest {
            kind,
            manifest_url: url,
            manifest,
            package_url,
            icon_url,
        })
    }
}

/// Whether a media type (already lowercased, without parameters) is JSON.
fn is_json_media_type(media_type: &str) -> bool {
    JSON_MEDIA_TYPES.contains(&media_type) || media_type.ends_with("+json")
}

fn parse_http_url(url: &str) -> Result<Url, ManifestError> {
    let parsed = Url::parse(url).map_err(|e| ManifestError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ManifestError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}

/// Resolve a manifest-relative path against the manifest URL.
fn resolve(base: &Url, path: &str) -> Result<String, ManifestError> {
    base.join(path)
        .map(|url| url.to_string())
        .map_err(|e| ManifestError::InvalidUrl {
            url: path.to_string(),
            reason: e.to_string(),
        })
}
