//! Image resolution: durable cache first, then the record's own URLs, then
//! external image search. Only successful resolutions are cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use wander_core::{ConnectivityProbe, Destination, ImageCache, ImageCacheEntry, WanderError};
use wander_integrations::ImageSearchProvider;

use crate::fallback::{MultiProviderResolver, Resolution, ResolutionTier};

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// The record's single explicit `imageUrl`.
pub struct ExplicitUrlTier;

#[async_trait]
impl ResolutionTier<Destination, String> for ExplicitUrlTier {
    fn name(&self) -> &str {
        "explicit_url"
    }

    async fn attempt(&self, _id: &str, dest: &Destination) -> Result<Option<String>, WanderError> {
        Ok(dest.image_url.as_deref().and_then(non_blank))
    }
}

/// First usable entry of the record's `imageUrls`. An empty list is a miss.
pub struct ImageListTier;

#[async_trait]
impl ResolutionTier<Destination, String> for ImageListTier {
    fn name(&self) -> &str {
        "image_list"
    }

    async fn attempt(&self, _id: &str, dest: &Destination) -> Result<Option<String>, WanderError> {
        Ok(dest.image_urls.iter().find_map(|u| non_blank(u)))
    }
}

/// An external search provider, skipped while offline.
pub struct SearchTier {
    provider: Arc<dyn ImageSearchProvider>,
    connectivity: Arc<ConnectivityProbe>,
    timeout: Duration,
}

impl SearchTier {
    pub fn new(
        provider: Arc<dyn ImageSearchProvider>,
        connectivity: Arc<ConnectivityProbe>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            connectivity,
            timeout,
        }
    }

    fn query(dest: &Destination) -> String {
        if dest.location.trim().is_empty() {
            dest.name.trim().to_string()
        } else {
            format!("{} {}", dest.name.trim(), dest.location.trim())
        }
    }
}

#[async_trait]
impl ResolutionTier<Destination, String> for SearchTier {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn attempt(&self, _id: &str, dest: &Destination) -> Result<Option<String>, WanderError> {
        if !self.connectivity.is_online().await {
            return Ok(None);
        }
        // Wikipedia titles rarely include the region, so try the bare name first.
        let mut queries = vec![dest.name.trim().to_string()];
        let full = Self::query(dest);
        if full != queries[0] {
            queries.push(full);
        }

        for query in queries.into_iter().filter(|q| !q.is_empty()) {
            let found = tokio::time::timeout(self.timeout, self.provider.search(&query))
                .await
                .map_err(|_| WanderError::timeout("image search", self.timeout))?
                .map_err(|e| WanderError::unavailable(format!("{}: {e:#}", self.provider.name())))?;
            if let Some(url) = found.as_deref().and_then(non_blank) {
                return Ok(Some(url));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// ImageResolver
// ---------------------------------------------------------------------------

pub struct ImageResolver {
    cache: Arc<ImageCache>,
    chain: MultiProviderResolver<Destination, String>,
}

impl ImageResolver {
    /// Chain: explicit URL, image list, then `providers` in order.
    pub fn new(
        cache: Arc<ImageCache>,
        connectivity: Arc<ConnectivityProbe>,
        providers: Vec<Arc<dyn ImageSearchProvider>>,
        timeout: Duration,
    ) -> Self {
        let mut tiers: Vec<Arc<dyn ResolutionTier<Destination, String>>> =
            vec![Arc::new(ExplicitUrlTier), Arc::new(ImageListTier)];
        for provider in providers {
            tiers.push(Arc::new(SearchTier::new(
                provider,
                Arc::clone(&connectivity),
                timeout,
            )));
        }
        Self {
            cache,
            chain: MultiProviderResolver::new("images", tiers),
        }
    }

    pub fn chain(&self) -> &MultiProviderResolver<Destination, String> {
        &self.chain
    }

    /// Cached entry if present, otherwise run the chain and cache a hit.
    /// `Ok(None)` means unresolved; show a placeholder.
    pub async fn resolve(&self, dest: &Destination) -> Result<Option<ImageCacheEntry>, WanderError> {
        if let Some(entry) = self.cache.get(&dest.id)? {
            debug!(entity_id = %dest.id, provider = %entry.provider, "Image cache hit");
            return Ok(Some(entry));
        }

        match self.chain.resolve(&dest.id, dest).await? {
            Resolution::Resolved { value, provider } => {
                let entry = ImageCacheEntry {
                    entity_id: dest.id.clone(),
                    url: value,
                    provider,
                    fetched_at: Utc::now(),
                };
                self.cache.put(&entry)?;
                Ok(Some(entry))
            }
            Resolution::Unresolved => Ok(None),
        }
    }

    pub fn invalidate(&self, entity_id: &str) -> Result<(), WanderError> {
        self.cache.invalidate(entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wander_core::{Database, Reachability};

    struct Online;

    #[async_trait]
    impl Reachability for Online {
        async fn check(&self) -> bool {
            true
        }
    }

    struct FakeSearch {
        name: &'static str,
        reply: Option<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeSearch {
        fn new(name: &'static str, reply: Option<&'static str>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageSearchProvider for FakeSearch {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("503 Service Unavailable");
            }
            Ok(self.reply.map(str::to_string))
        }
    }

    fn resolver(providers: Vec<Arc<FakeSearch>>) -> (ImageResolver, Arc<ImageCache>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(ImageCache::new(db));
        let probe = Arc::new(ConnectivityProbe::new(
            Arc::new(Online),
            Duration::from_secs(3),
            Duration::from_secs(5),
        ));
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn ImageSearchProvider>)
            .collect();
        (
            ImageResolver::new(Arc::clone(&cache), probe, providers, Duration::from_secs(5)),
            cache,
        )
    }

    fn hawa_mahal() -> Destination {
        Destination::new("hawa_mahal", "Hawa Mahal").with_location("Jaipur")
    }

    #[tokio::test]
    async fn image_list_used_when_no_explicit_url() {
        let search = FakeSearch::new("search", Some("https://s/1.jpg"), false);
        let (r, _) = resolver(vec![search.clone()]);
        let mut dest = hawa_mahal();
        dest.image_urls = vec!["  ".into(), "https://list/2.jpg".into()];

        let entry = r.resolve(&dest).await.unwrap().unwrap();
        assert_eq!(entry.url, "https://list/2.jpg");
        assert_eq!(entry.provider, "image_list");
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_list_and_blank_url_fall_through_to_search() {
        let first = FakeSearch::new("first", Some(""), false);
        let second = FakeSearch::new("second", Some("https://s/2.jpg"), false);
        let (r, _) = resolver(vec![first.clone(), second.clone()]);
        let mut dest = hawa_mahal();
        dest.image_url = Some("".into());

        let entry = r.resolve(&dest).await.unwrap().unwrap();
        assert_eq!(entry.provider, "second");
        // Bare name, then name + location.
        assert_eq!(first.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_provider_falls_through() {
        let first = FakeSearch::new("first", None, true);
        let second = FakeSearch::new("second", Some("https://s/2.jpg"), false);
        let (r, _) = resolver(vec![first, second]);
        let entry = r.resolve(&hawa_mahal()).await.unwrap().unwrap();
        assert_eq!(entry.url, "https://s/2.jpg");
        assert_eq!(r.chain().fallback_history().len(), 1);
    }

    #[tokio::test]
    async fn cache_hit_skips_every_provider() {
        let search = FakeSearch::new("search", Some("https://s/1.jpg"), false);
        let (r, _) = resolver(vec![search.clone()]);

        r.resolve(&hawa_mahal()).await.unwrap().unwrap();
        r.resolve(&hawa_mahal()).await.unwrap().unwrap();
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        r.invalidate("hawa_mahal").unwrap();
        r.resolve(&hawa_mahal()).await.unwrap().unwrap();
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }
}
