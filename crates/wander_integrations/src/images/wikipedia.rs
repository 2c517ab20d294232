use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ImageSearchProvider, non_empty_url};

const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org/api/rest_v1";

/// Lead image of the Wikipedia article titled like the destination.
pub struct WikipediaImageSearch {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(default)]
    originalimage: Option<ImageRef>,
    #[serde(default)]
    thumbnail: Option<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    source: String,
}

impl WikipediaImageSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wander/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `{base}/page/summary/{Title_With_Underscores}`, percent-encoded.
    fn summary_url(&self, query: &str) -> Result<Url> {
        let title = query.split_whitespace().collect::<Vec<_>>().join("_");
        let mut url = Url::parse(&self.base_url).context("invalid Wikipedia base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Wikipedia base URL cannot have a path"))?
            .extend(["page", "summary", title.as_str()]);
        Ok(url)
    }
}

fn pick_image(summary: PageSummary) -> Option<String> {
    non_empty_url(summary.originalimage.as_ref().map(|i| i.source.as_str()))
        .or_else(|| non_empty_url(summary.thumbnail.as_ref().map(|i| i.source.as_str())))
}

#[async_trait]
impl ImageSearchProvider for WikipediaImageSearch {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn search(&self, query: &str) -> Result<Option<String>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let url = self.summary_url(query)?;
        debug!(url = %url, "Wikipedia image lookup");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Wikipedia summary request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("Wikipedia summary error ({status})");
        }
        let summary: PageSummary = response
            .json()
            .await
            .context("failed to parse Wikipedia summary")?;
        Ok(pick_image(summary))
    }
}
