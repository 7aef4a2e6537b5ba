//! External image-search collaborator.
//!
//! Reference-image search for an artist goes through a third-party image
//! search API. This is a thin client: fetch a session token, query the
//! image endpoint, and hand back the raw results. Known explicit-content
//! thumbnails are dropped by the caller via [`is_explicit_thumbnail`].

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::SearchConfig;
use crate::error::ApiError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Search for images matching `keywords`, returning at most `limit`
    /// raw result objects.
    async fn search_images(&self, keywords: &str, limit: usize) -> Result<Vec<Value>, ApiError>;
}

/// Marker the upstream puts on explicit-content thumbnails.
pub fn is_explicit_thumbnail(thumbnail_url: &str) -> bool {
    thumbnail_url.contains(".explicit.bing")
}

/// Build the human-facing search page URL for a keyword query.
pub fn search_page_url(endpoint: &str, keywords: &str) -> String {
    Url::parse_with_params(
        endpoint,
        &[("iax", "images"), ("ia", "images"), ("q", keywords)],
    )
    .map(|u| u.to_string())
    .unwrap_or_else(|_| endpoint.to_string())
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// HTTP client for the image search API.
pub struct SearchClient {
    http: reqwest::Client,
    endpoint: String,
    region: String,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ApiError::Upstream(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
        })
    }

    /// The image endpoint requires a per-query session token embedded in
    /// the search page.
    async fn fetch_token(&self, keywords: &str) -> Result<String, ApiError> {
        let page = self
            .http
            .get(&self.endpoint)
            .query(&[("q", keywords)])
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("image search token fetch failed: {e}")))?
            .text()
            .await
            .map_err(|e| ApiError::Upstream(format!("image search token fetch failed: {e}")))?;

        extract_token(&page)
            .ok_or_else(|| ApiError::Upstream("image search token missing from response".into()))
    }
}

/// Pull the `vqd` session token out of the search page markup.
fn extract_token(page: &str) -> Option<String> {
    for pattern in ["vqd=\"", "vqd='", "vqd="] {
        if let Some(start) = page.find(pattern) {
            let rest = &page[start + pattern.len()..];
            let token: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
    None
}

#[async_trait]
impl ImageSearch for SearchClient {
    #[instrument(skip(self))]
    async fn search_images(&self, keywords: &str, limit: usize) -> Result<Vec<Value>, ApiError> {
        let token = self.fetch_token(keywords).await?;

        let response: SearchResponse = self
            .http
            .get(format!("{}/i.js", self.endpoint))
            .query(&[
                ("q", keywords),
                ("o", "json"),
                ("l", self.region.as_str()),
                ("vqd", token.as_str()),
                ("f", ",,,,,"),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("image search failed: {e}")))?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("image search returned malformed data: {e}")))?;

        debug!(count = response.results.len(), "Image search results");
        Ok(response.results.into_iter().take(limit).collect())
    }
}
