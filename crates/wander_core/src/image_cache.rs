use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::error::WanderError;
use crate::persistence::{Database, ImageRow};
use crate::types::ImageCacheEntry;

/// Durable entity-id → image URL cache. Entries never expire on their own;
/// they are reused across restarts until invalidated or cleared.
pub struct ImageCache {
    db: Arc<Database>,
}

impl ImageCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, entity_id: &str) -> Result<Option<ImageCacheEntry>, WanderError> {
        let row = self
            .db
            .get_image(entity_id)
            .map_err(|e| WanderError::store(format!("{e:#}")))?;
        Ok(row.map(|r| ImageCacheEntry {
            fetched_at: Utc
                .timestamp_millis_opt(r.fetched_at)
                .single()
                .unwrap_or_else(Utc::now),
            entity_id: r.entity_id,
            url: r.url,
            provider: r.provider,
        }))
    }

    pub fn put(&self, entry: &ImageCacheEntry) -> Result<(), WanderError> {
        self.db
            .put_image(&ImageRow {
                entity_id: entry.entity_id.clone(),
                url: entry.url.clone(),
                provider: entry.provider.clone(),
                fetched_at: entry.fetched_at.timestamp_millis(),
            })
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }

    pub fn invalidate(&self, entity_id: &str) -> Result<(), WanderError> {
        self.db
            .delete_image(entity_id)
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }

    pub fn clear(&self) -> Result<(), WanderError> {
        self.db
            .clear_images()
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_invalidate() {
        let cache = ImageCache::new(Arc::new(Database::open_in_memory().unwrap()));
        assert!(cache.get("taj").unwrap().is_none());

        let entry = ImageCacheEntry {
            entity_id: "taj".into(),
            url: "https://img.example/taj.jpg".into(),
            provider: "unsplash".into(),
            fetched_at: Utc::now(),
        };
        cache.put(&entry).unwrap();
        let got = cache.get("taj").unwrap().unwrap();
        assert_eq!(got.url, entry.url);
        assert_eq!(got.provider, "unsplash");

        cache.invalidate("taj").unwrap();
        assert!(cache.get("taj").unwrap().is_none());
    }
}
