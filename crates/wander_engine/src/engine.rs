//! TravelEngine: the composition root.
//!
//! Built once at process start and shared by `Arc`. Every long-lived
//! resource (database, connectivity probe, local model bridge) exists once
//! and is handed to the components that need it.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use wander_ai::{
    Answer, ChatSession, EnrichmentGateway, EnrichmentModel, EnrichmentState, GeminiProvider,
    HybridInferenceRouter, LlamaServerBridge, LocalInferenceBridge, RemoteChatModel,
    RouterConfig,
};
use wander_core::{
    ConnectivityProbe, Database, Destination, EntityStore, FreshnessPolicy, FreshnessTracker,
    HttpReachability, ImageCache, ImageCacheEntry, Reachability, SimulatedConditions,
    WanderConfig, WanderError,
};
use wander_integrations::{
    FirestoreClient, ImageSearchProvider, QueryFilter, RemoteDocumentStore, UnsplashImageSearch,
    WikipediaImageSearch,
};

use crate::destinations::DestinationResolver;
use crate::images::ImageResolver;

/// External collaborators and storage for [`TravelEngine::new`].
pub struct EngineParts {
    pub config: WanderConfig,
    pub db: Arc<Database>,
    pub reachability: Arc<dyn Reachability>,
    pub remote_store: Option<Arc<dyn RemoteDocumentStore>>,
    /// In priority order.
    pub image_providers: Vec<Arc<dyn ImageSearchProvider>>,
    pub enrichment_model: Option<Arc<dyn EnrichmentModel>>,
    pub chat_model: Option<Arc<dyn RemoteChatModel>>,
    pub local_model: Option<Arc<dyn LocalInferenceBridge>>,
}

pub struct TravelEngine {
    config: WanderConfig,
    store: Arc<EntityStore>,
    freshness: Arc<FreshnessTracker>,
    image_cache: Arc<ImageCache>,
    connectivity: Arc<ConnectivityProbe>,
    gateway: Arc<EnrichmentGateway>,
    router: Arc<HybridInferenceRouter>,
    destinations: DestinationResolver,
    images: ImageResolver,
}

impl TravelEngine {
    pub fn new(parts: EngineParts) -> Self {
        let EngineParts {
            config,
            db,
            reachability,
            remote_store,
            image_providers,
            enrichment_model,
            chat_model,
            local_model,
        } = parts;

        let store = Arc::new(EntityStore::new(Arc::clone(&db)));
        let freshness = Arc::new(FreshnessTracker::new(
            Arc::clone(&db),
            FreshnessPolicy::from_config(&config),
        ));
        let image_cache = Arc::new(ImageCache::new(db));
        let connectivity = Arc::new(ConnectivityProbe::new(
            reachability,
            config.probe_timeout(),
            config.connectivity_cache_window(),
        ));

        let gateway = Arc::new(EnrichmentGateway::new(
            Arc::clone(&store),
            Arc::clone(&freshness),
            Arc::clone(&connectivity),
            enrichment_model,
            config.remote_timeout(),
        ));
        let router = Arc::new(HybridInferenceRouter::new(
            Arc::clone(&connectivity),
            chat_model,
            local_model,
            RouterConfig::from_config(&config),
        ));
        let destinations = DestinationResolver::new(
            Arc::clone(&store),
            remote_store,
            Arc::clone(&connectivity),
            Some(Arc::clone(&gateway)),
            config.enrich_on_resolve,
            config.remote_timeout(),
        );
        let images = ImageResolver::new(
            Arc::clone(&image_cache),
            Arc::clone(&connectivity),
            image_providers,
            config.remote_timeout(),
        );

        Self {
            config,
            store,
            freshness,
            image_cache,
            connectivity,
            gateway,
            router,
            destinations,
            images,
        }
    }

    /// Wire real providers from configuration. Providers without credentials
    /// are left out of their chains.
    pub fn from_config(config: WanderConfig) -> Result<Self> {
        WanderConfig::ensure_dirs()?;
        let db = Arc::new(Database::open().context("open database")?);

        let reachability: Arc<dyn Reachability> = Arc::new(HttpReachability::new(
            config.probe_url.clone(),
            config.probe_timeout(),
        ));

        let remote_store = match FirestoreClient::from_config(&config) {
            Some(client) => Some(Arc::new(client?) as Arc<dyn RemoteDocumentStore>),
            None => None,
        };

        let mut image_providers: Vec<Arc<dyn ImageSearchProvider>> = vec![Arc::new(
            WikipediaImageSearch::new(config.remote_timeout())?,
        )];
        if let Some(unsplash) = UnsplashImageSearch::from_config(&config) {
            image_providers.push(Arc::new(unsplash?));
        }

        let gemini = GeminiProvider::from_config(&config).map(Arc::new);
        let enrichment_model = gemini
            .clone()
            .map(|g| g as Arc<dyn EnrichmentModel>);
        let chat_model = gemini.map(|g| g as Arc<dyn RemoteChatModel>);

        let local_model: Option<Arc<dyn LocalInferenceBridge>> =
            Some(Arc::new(LlamaServerBridge::from_config(&config)));

        info!(
            remote_store = remote_store.is_some(),
            image_providers = image_providers.len(),
            remote_model = chat_model.is_some(),
            "Travel engine configured"
        );

        Ok(Self::new(EngineParts {
            config,
            db,
            reachability,
            remote_store,
            image_providers,
            enrichment_model,
            chat_model,
            local_model,
        }))
    }

    pub fn config(&self) -> &WanderConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityProbe> {
        &self.connectivity
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<EnrichmentGateway> {
        &self.gateway
    }

    pub fn destinations(&self) -> &DestinationResolver {
        &self.destinations
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn is_online(&self) -> bool {
        self.connectivity.is_online().await
    }

    pub fn simulate(&self, conditions: SimulatedConditions) {
        self.connectivity.simulate(conditions);
    }

    /// Destination detail. `preloaded` short-circuits every other tier.
    pub async fn destination(
        &self,
        id: &str,
        preloaded: Option<Destination>,
    ) -> Result<Option<Destination>, WanderError> {
        self.destinations.resolve(id, preloaded).await
    }

    pub async fn browse(
        &self,
        filters: &[QueryFilter],
        limit: usize,
    ) -> Result<Vec<Destination>, WanderError> {
        self.destinations.browse(filters, limit).await
    }

    pub async fn image(&self, dest: &Destination) -> Result<Option<ImageCacheEntry>, WanderError> {
        self.images.resolve(dest).await
    }

    pub async fn enrichment_state(&self, id: &str) -> Result<EnrichmentState, WanderError> {
        self.gateway.state(id).await
    }

    pub async fn answer(&self, question: &str, dest: &Destination) -> Answer {
        self.router.answer(question, dest).await
    }

    /// A new conversation about `dest`.
    pub fn chat(&self, dest: Destination) -> ChatSession {
        ChatSession::new(dest, Arc::clone(&self.router))
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Drop every cached record, freshness mark and image. The only path
    /// that deletes cached data.
    pub fn clear_caches(&self) -> Result<(), WanderError> {
        self.store.clear()?;
        self.freshness.clear()?;
        self.image_cache.clear()?;
        self.destinations.chain().reset_health();
        self.images.chain().reset_health();
        info!("All caches cleared");
        Ok(())
    }
}
