use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use wander_core::WanderConfig;

use super::{ImageSearchProvider, non_empty_url};

const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";

/// First landscape photo from Unsplash search.
pub struct UnsplashImageSearch {
    base_url: String,
    access_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    #[serde(default)]
    regular: Option<String>,
    #[serde(default)]
    full: Option<String>,
}

impl UnsplashImageSearch {
    pub fn new(access_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            access_key: access_key.into(),
            client,
        })
    }

    /// `None` when no access key is configured.
    pub fn from_config(config: &WanderConfig) -> Option<Result<Self>> {
        let key = config.unsplash_access_key.clone().filter(|k| !k.is_empty())?;
        Some(Self::new(key, config.remote_timeout()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

fn first_photo(resp: SearchResponse) -> Option<String> {
    let photo = resp.results.into_iter().next()?;
    non_empty_url(photo.urls.regular.as_deref()).or_else(|| non_empty_url(photo.urls.full.as_deref()))
}

#[async_trait]
impl ImageSearchProvider for UnsplashImageSearch {
    fn name(&self) -> &str {
        "unsplash"
    }

    async fn search(&self, query: &str) -> Result<Option<String>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let url = format!("{}/search/photos", self.base_url);
        debug!(url = %url, query, "Unsplash image search");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .query(&[
                ("query", query),
                ("per_page", "1"),
                ("orientation", "landscape"),
            ])
            .send()
            .await
            .context("Unsplash search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Unsplash search error ({}): {}", status, body);
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .context("failed to parse Unsplash search response")?;
        Ok(first_photo(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_regular_url_of_first_result() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{"total":2,"results":[
                {"urls":{"regular":"https://u/1r.jpg","full":"https://u/1f.jpg"}},
                {"urls":{"regular":"https://u/2r.jpg"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(first_photo(resp).as_deref(), Some("https://u/1r.jpg"));
    }

    #[test]
    fn empty_results_find_nothing() {
        let resp: SearchResponse = serde_json::from_str(r#"{"total":0,"results":[]}"#).unwrap();
        assert!(first_photo(resp).is_none());
        let resp: SearchResponse =
            serde_json::from_str(r#"{"results":[{"urls":{"regular":""}}]}"#).unwrap();
        assert!(first_photo(resp).is_none());
    }

    #[test]
    fn from_config_requires_key() {
        let mut config = WanderConfig::default();
        assert!(UnsplashImageSearch::from_config(&config).is_none());
        config.unsplash_access_key = Some("abc".into());
        assert!(UnsplashImageSearch::from_config(&config).unwrap().is_ok());
    }
}
