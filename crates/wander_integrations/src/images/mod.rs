//! Image search providers used to find a picture for a destination when the
//! record carries none.

pub mod unsplash;
pub mod wikipedia;

use anyhow::Result;
use async_trait::async_trait;

pub use unsplash::UnsplashImageSearch;
pub use wikipedia::WikipediaImageSearch;

/// One external image search. `Ok(None)` means "nothing found"; errors are
/// transport or API failures. Both are treated as a failed tier upstream.
#[async_trait]
pub trait ImageSearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Option<String>>;
}

/// Non-empty, trimmed URL or `None`.
pub(crate) fn non_empty_url(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}
