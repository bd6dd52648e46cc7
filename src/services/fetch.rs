//! Source image fetching service
//!
//! Downloads the image referenced by a cutout request. This is the only
//! pipeline stage that performs external I/O; it enforces a total timeout,
//! a User-Agent, a bounded redirect policy and an image content type.

use crate::{
    config::FetchConfig,
    error::{CutoutError, Result},
};
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, Url};
use std::time::Duration;
use tracing::{debug, field::Empty, instrument, warn};

/// Raw bytes returned by a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// Lowercased `Content-Type` header as declared by the source
    pub content_type: String,
    /// URL after redirects
    pub final_url: String,
}

/// HTTP fetcher for source images
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    /// Create a fetcher from configuration
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| CutoutError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Parse and check a source URL before any network activity
    ///
    /// # Errors
    /// - URL does not parse
    /// - Scheme is not `http` or `https`
    pub fn validate_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| CutoutError::download(format!("invalid source URL '{url}': {e}")))?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(CutoutError::download(format!(
                "unsupported URL scheme '{scheme}' (only http and https are fetched)"
            ))),
        }
    }

    /// Whether a declared content type indicates an image
    #[must_use]
    pub fn is_image_content_type(content_type: &str) -> bool {
        content_type.to_ascii_lowercase().contains("image")
    }

    /// Fetch the source image
    ///
    /// # Errors
    /// - `Download` for invalid URLs, transport failures, timeouts and non-2xx statuses
    /// - `InvalidContent` when the response is not declared as an image
    #[instrument(skip(self), fields(status = Empty, content_type = Empty, bytes = Empty))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let parsed = Self::validate_url(url)?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CutoutError::from_transport(url, &e))?;

        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());
        if !status.is_success() {
            warn!(%status, "source responded with error status");
            return Err(CutoutError::download(format!("HTTP {status} for url: {url}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        tracing::Span::current().record("content_type", content_type.as_str());

        if !Self::is_image_content_type(&content_type) {
            warn!(content_type = %content_type, "source is not an image");
            return Err(CutoutError::invalid_content("non-image content"));
        }

        let final_url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CutoutError::from_transport(url, &e))?
            .to_vec();
        tracing::Span::current().record("bytes", bytes.len());

        debug!(final_url = %final_url, "source image downloaded");
        Ok(FetchedImage {
            bytes,
            content_type,
            final_url,
        })
    }
}
