//! Destination-detail resolution.
//!
//! Tier order: caller-supplied record, local store, remote store (skipped
//! while offline). Whatever is found outside the local store is written
//! back so the next offline read succeeds, then optionally enriched.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use wander_ai::{EnrichedFields, EnrichmentGateway, EnrichmentStatus};
use wander_core::{ConnectivityProbe, Destination, EntityStore, Provenance, WanderError};
use wander_integrations::{FilterOp, QueryFilter, RemoteDocument, RemoteDocumentStore};

use crate::fallback::{MultiProviderResolver, Resolution, ResolutionTier};

pub const PRELOADED_TIER: &str = "preloaded";
pub const LOCAL_TIER: &str = "local_store";
pub const REMOTE_TIER: &str = "remote_store";

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// A record the caller already holds (e.g. from a list screen).
pub struct PreloadedTier;

#[async_trait]
impl ResolutionTier<Option<Destination>, Destination> for PreloadedTier {
    fn name(&self) -> &str {
        PRELOADED_TIER
    }

    async fn attempt(
        &self,
        id: &str,
        preloaded: &Option<Destination>,
    ) -> Result<Option<Destination>, WanderError> {
        Ok(preloaded
            .as_ref()
            .filter(|d| d.id == id)
            .cloned()
            .map(|d| d.with_provenance(Provenance::Preloaded)))
    }
}

pub struct LocalStoreTier {
    store: Arc<EntityStore>,
}

#[async_trait]
impl ResolutionTier<Option<Destination>, Destination> for LocalStoreTier {
    fn name(&self) -> &str {
        LOCAL_TIER
    }

    async fn attempt(
        &self,
        id: &str,
        _preloaded: &Option<Destination>,
    ) -> Result<Option<Destination>, WanderError> {
        self.store.get(id)
    }
}

pub struct RemoteStoreTier {
    remote: Arc<dyn RemoteDocumentStore>,
    connectivity: Arc<ConnectivityProbe>,
    timeout: Duration,
    /// Remote calls issued, for diagnostics.
    calls: std::sync::atomic::AtomicU64,
}

#[async_trait]
impl ResolutionTier<Option<Destination>, Destination> for RemoteStoreTier {
    fn name(&self) -> &str {
        REMOTE_TIER
    }

    async fn attempt(
        &self,
        id: &str,
        _preloaded: &Option<Destination>,
    ) -> Result<Option<Destination>, WanderError> {
        if !self.connectivity.is_online().await {
            debug!(entity_id = id, "Offline, remote store skipped");
            return Ok(None);
        }
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let doc = tokio::time::timeout(self.timeout, self.remote.get(id))
            .await
            .map_err(|_| WanderError::timeout("remote get", self.timeout))?
            .map_err(|e| WanderError::unavailable(format!("remote store: {e:#}")))?;
        doc.map(decode_document).transpose()
    }
}

fn decode_document(doc: RemoteDocument) -> Result<Destination, WanderError> {
    Destination::from_document(&doc.id, doc.fields).map_err(|e| {
        WanderError::unavailable(format!("undecodable remote document '{}': {e}", doc.id))
    })
}

// ---------------------------------------------------------------------------
// DestinationResolver
// ---------------------------------------------------------------------------

pub struct DestinationResolver {
    store: Arc<EntityStore>,
    remote: Option<Arc<dyn RemoteDocumentStore>>,
    remote_tier: Option<Arc<RemoteStoreTier>>,
    connectivity: Arc<ConnectivityProbe>,
    gateway: Option<Arc<EnrichmentGateway>>,
    enrich_on_resolve: bool,
    timeout: Duration,
    chain: MultiProviderResolver<Option<Destination>, Destination>,
}

impl DestinationResolver {
    pub fn new(
        store: Arc<EntityStore>,
        remote: Option<Arc<dyn RemoteDocumentStore>>,
        connectivity: Arc<ConnectivityProbe>,
        gateway: Option<Arc<EnrichmentGateway>>,
        enrich_on_resolve: bool,
        timeout: Duration,
    ) -> Self {
        let remote_tier = remote.as_ref().map(|r| {
            Arc::new(RemoteStoreTier {
                remote: Arc::clone(r),
                connectivity: Arc::clone(&connectivity),
                timeout,
                calls: std::sync::atomic::AtomicU64::new(0),
            })
        });

        let mut tiers: Vec<Arc<dyn ResolutionTier<Option<Destination>, Destination>>> = vec![
            Arc::new(PreloadedTier),
            Arc::new(LocalStoreTier {
                store: Arc::clone(&store),
            }),
        ];
        if let Some(ref tier) = remote_tier {
            tiers.push(Arc::clone(tier) as Arc<dyn ResolutionTier<_, _>>);
        }

        Self {
            store,
            remote,
            remote_tier,
            connectivity,
            gateway,
            enrich_on_resolve,
            timeout,
            chain: MultiProviderResolver::new("destinations", tiers),
        }
    }

    pub fn chain(&self) -> &MultiProviderResolver<Option<Destination>, Destination> {
        &self.chain
    }

    /// Remote `get` calls issued by the detail chain.
    pub fn remote_calls(&self) -> u64 {
        self.remote_tier
            .as_ref()
            .map(|t| t.calls.load(std::sync::atomic::Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Resolve one destination. `Ok(None)` means not found anywhere.
    pub async fn resolve(
        &self,
        id: &str,
        preloaded: Option<Destination>,
    ) -> Result<Option<Destination>, WanderError> {
        let (dest, provider) = match self.chain.resolve(id, &preloaded).await? {
            Resolution::Resolved { value, provider } => (value, provider),
            Resolution::Unresolved => {
                debug!(entity_id = id, "Destination unresolved");
                return Ok(None);
            }
        };

        let dest = if provider != LOCAL_TIER {
            let dest = self.keep_enrichment(dest)?;
            self.store.upsert_one(&dest)?;
            debug!(entity_id = id, source = %provider, "Destination written back");
            dest
        } else {
            dest
        };

        if !self.enrich_on_resolve {
            return Ok(Some(dest));
        }
        self.enrich(dest).await.map(Some)
    }

    /// A plain record about to replace a stored enriched one inherits the
    /// stored enrichment, so the freshness mark keeps describing what is stored.
    fn keep_enrichment(&self, mut incoming: Destination) -> Result<Destination, WanderError> {
        if incoming.provenance == Provenance::Enriched {
            return Ok(incoming);
        }
        if let Some(stored) = self.store.get(&incoming.id)? {
            if stored.provenance == Provenance::Enriched {
                EnrichedFields::from_destination(&stored).apply_to(&mut incoming);
                debug!(entity_id = %incoming.id, "Kept stored enrichment on write-back");
            }
        }
        Ok(incoming)
    }

    /// Run the enrichment gateway; recoverable failures keep `dest` as is.
    async fn enrich(&self, dest: Destination) -> Result<Destination, WanderError> {
        let Some(gateway) = self.gateway.as_ref() else {
            return Ok(dest);
        };
        let fallback = dest.clone();
        match gateway.maybe_enrich(dest).await {
            Ok(outcome) => {
                if outcome.status == EnrichmentStatus::Enriched {
                    self.publish(&outcome.destination);
                }
                Ok(outcome.destination)
            }
            Err(e) if e.is_recoverable() => {
                warn!(entity_id = %fallback.id, error = %e, "Enrichment skipped");
                Ok(fallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort background write of an enriched record to the remote store.
    fn publish(&self, dest: &Destination) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let id = dest.id.clone();
        let fields = dest.to_document();
        let timeout = self.timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, remote.upsert(&id, &fields)).await {
                Ok(Ok(())) => debug!(entity_id = %id, "Enriched record published"),
                Ok(Err(e)) => warn!(entity_id = %id, error = %format!("{e:#}"), "Publishing enriched record failed"),
                Err(_) => warn!(entity_id = %id, "Publishing enriched record timed out"),
            }
        });
    }

    /// List destinations. Online, queries the remote store and writes every
    /// record back; offline or on remote failure, lists the local store.
    pub async fn browse(
        &self,
        filters: &[QueryFilter],
        limit: usize,
    ) -> Result<Vec<Destination>, WanderError> {
        if let Some(remote) = self.remote.as_ref() {
            if self.connectivity.is_online().await {
                match tokio::time::timeout(self.timeout, remote.query(filters, limit)).await {
                    Ok(Ok(docs)) => {
                        let mut records = Vec::with_capacity(docs.len());
                        for doc in docs {
                            match decode_document(doc) {
                                Ok(d) => records.push(self.keep_enrichment(d)?),
                                Err(e) => warn!(error = %e, "Skipping remote document"),
                            }
                        }
                        self.store.upsert(&records)?;
                        info!(count = records.len(), "Browsed remote destinations");
                        return Ok(records);
                    }
                    Ok(Err(e)) => {
                        warn!(error = %format!("{e:#}"), "Remote browse failed, using local store");
                    }
                    Err(_) => warn!("Remote browse timed out, using local store"),
                }
            }
        }

        let matching = self
            .store
            .all()?
            .into_iter()
            .filter(|d| filters.iter().all(|f| matches_filter(d, f)))
            .take(limit)
            .collect();
        Ok(matching)
    }
}

/// Local evaluation of a filter on a top-level field. A missing field or a
/// type mismatch never matches.
fn matches_filter(dest: &Destination, filter: &QueryFilter) -> bool {
    let doc = dest.to_document();
    let Some(value) = doc.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Equal => value == &filter.value,
        FilterOp::NotEqual => value != &filter.value,
        FilterOp::ArrayContains => value
            .as_array()
            .is_some_and(|items| items.contains(&filter.value)),
        FilterOp::LessThan => compare(value, &filter.value) == Some(Ordering::Less),
        FilterOp::GreaterThan => compare(value, &filter.value) == Some(Ordering::Greater),
    }
}

/// Numbers compare numerically, strings lexically; anything else is unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wander_core::{Database, Reachability, SimulatedConditions};

    struct Online;

    #[async_trait]
    impl Reachability for Online {
        async fn check(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeRemote {
        docs: Mutex<HashMap<String, Value>>,
        fail: bool,
        gets: AtomicUsize,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl RemoteDocumentStore for FakeRemote {
        async fn get(&self, id: &str) -> anyhow::Result<Option<RemoteDocument>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("permission denied");
            }
            Ok(self.docs.lock().get(id).map(|f| RemoteDocument {
                id: id.to_string(),
                fields: f.clone(),
            }))
        }

        async fn query(
            &self,
            _filters: &[QueryFilter],
            limit: usize,
        ) -> anyhow::Result<Vec<RemoteDocument>> {
            if self.fail {
                anyhow::bail!("permission denied");
            }
            Ok(self
                .docs
                .lock()
                .iter()
                .take(limit)
                .map(|(id, f)| RemoteDocument {
                    id: id.clone(),
                    fields: f.clone(),
                })
                .collect())
        }

        async fn upsert(&self, id: &str, fields: &Value) -> anyhow::Result<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            self.docs.lock().insert(id.to_string(), fields.clone());
            Ok(())
        }
    }

    struct Fixture {
        resolver: DestinationResolver,
        store: Arc<EntityStore>,
        probe: Arc<ConnectivityProbe>,
        remote: Arc<FakeRemote>,
    }

    fn fixture(remote: FakeRemote) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(EntityStore::new(db));
        let probe = Arc::new(ConnectivityProbe::new(
            Arc::new(Online),
            Duration::from_secs(3),
            Duration::from_secs(5),
        ));
        let remote = Arc::new(remote);
        let resolver = DestinationResolver::new(
            Arc::clone(&store),
            Some(Arc::clone(&remote) as Arc<dyn RemoteDocumentStore>),
            Arc::clone(&probe),
            None,
            false,
            Duration::from_secs(5),
        );
        Fixture {
            resolver,
            store,
            probe,
            remote,
        }
    }

    fn remote_with_red_fort() -> FakeRemote {
        let remote = FakeRemote::default();
        remote.docs.lock().insert(
            "red_fort".into(),
            json!({ "name": "Red Fort", "location": "Delhi", "category": "Monument" }),
        );
        remote
    }

    #[tokio::test]
    async fn preloaded_record_skips_everything_and_is_written_back() {
        let f = fixture(remote_with_red_fort());
        let pre = Destination::new("red_fort", "Red Fort (cached list)");

        let got = f.resolver.resolve("red_fort", Some(pre)).await.unwrap().unwrap();
        assert_eq!(got.provenance, Provenance::Preloaded);
        assert_eq!(f.remote.gets.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.store.get("red_fort").unwrap().unwrap().name,
            "Red Fort (cached list)"
        );
    }

    #[tokio::test]
    async fn remote_hit_is_written_back_for_offline_use() {
        let f = fixture(remote_with_red_fort());

        let got = f.resolver.resolve("red_fort", None).await.unwrap().unwrap();
        assert_eq!(got.provenance, Provenance::Remote);
        assert_eq!(got.location, "Delhi");

        f.probe.simulate(SimulatedConditions::offline());
        let again = f.resolver.resolve("red_fort", None).await.unwrap().unwrap();
        // Served from the local store; provenance records where it came from.
        assert_eq!(again, got);
        assert_eq!(f.remote.gets.load(Ordering::SeqCst), 1);
        assert_eq!(f.resolver.remote_calls(), 1);
    }

    #[tokio::test]
    async fn missing_everywhere_is_none() {
        let f = fixture(FakeRemote::default());
        assert!(f.resolver.resolve("atlantis", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_failure_is_unresolved_not_error() {
        let f = fixture(FakeRemote {
            fail: true,
            ..Default::default()
        });
        assert!(f.resolver.resolve("red_fort", None).await.unwrap().is_none());
        assert_eq!(f.resolver.chain().fallback_history().len(), 1);
    }

    #[tokio::test]
    async fn browse_online_populates_local_store() {
        let f = fixture(remote_with_red_fort());
        let list = f.resolver.browse(&[], 10).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(f.store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn browse_offline_filters_local_records() {
        let f = fixture(FakeRemote::default());
        let mut fort = Destination::new("red_fort", "Red Fort");
        fort.category = "Monument".into();
        let mut lake = Destination::new("dal_lake", "Dal Lake");
        lake.category = "Nature".into();
        f.store.upsert(&[fort, lake]).unwrap();
        f.probe.simulate(SimulatedConditions::offline());

        let all = f.resolver.browse(&[], 10).await.unwrap();
        assert_eq!(all.len(), 2);
        let monuments = f
            .resolver
            .browse(&[QueryFilter::eq("category", "Monument")], 10)
            .await
            .unwrap();
        assert_eq!(monuments.len(), 1);
        assert_eq!(monuments[0].id, "red_fort");
    }

    #[tokio::test]
    async fn plain_write_back_keeps_stored_enrichment() {
        let f = fixture(FakeRemote::default());
        let enriched = Destination::new("red_fort", "Red Fort")
            .with_description("Mughal palace fortress of red sandstone.")
            .with_provenance(Provenance::Enriched);
        f.store.upsert_one(&enriched).unwrap();

        let plain = Destination::new("red_fort", "Red Fort").with_description("A fort.");
        let got = f.resolver.resolve("red_fort", Some(plain)).await.unwrap().unwrap();

        assert_eq!(got.description, "Mughal palace fortress of red sandstone.");
        assert_eq!(got.provenance, Provenance::Enriched);
        assert_eq!(f.store.get("red_fort").unwrap().unwrap(), got);
    }

    #[tokio::test]
    async fn browse_online_keeps_stored_enrichment() {
        let f = fixture(remote_with_red_fort());
        let enriched = Destination::new("red_fort", "Red Fort")
            .with_description("Mughal palace fortress of red sandstone.")
            .with_provenance(Provenance::Enriched);
        f.store.upsert_one(&enriched).unwrap();

        let list = f.resolver.browse(&[], 10).await.unwrap();
        assert_eq!(list[0].description, "Mughal palace fortress of red sandstone.");
        assert_eq!(list[0].location, "Delhi");
        assert_eq!(
            f.store.get("red_fort").unwrap().unwrap().provenance,
            Provenance::Enriched
        );
    }

    #[tokio::test]
    async fn browse_offline_limit_applies_after_filtering() {
        let f = fixture(FakeRemote::default());
        let mut fort = Destination::new("red_fort", "Red Fort");
        fort.category = "Fort".into();
        f.store.upsert_one(&fort).unwrap();
        let mut lake = Destination::new("dal_lake", "Dal Lake");
        lake.category = "Lake".into();
        f.store.upsert_one(&lake).unwrap();
        f.probe.simulate(SimulatedConditions::offline());

        let forts = f
            .resolver
            .browse(&[QueryFilter::eq("category", "Fort")], 1)
            .await
            .unwrap();
        assert_eq!(forts.len(), 1);
        assert_eq!(forts[0].id, "red_fort");
    }

    #[tokio::test]
    async fn browse_offline_applies_range_filters() {
        let f = fixture(FakeRemote::default());
        let a = Destination::new("a", "A");
        let b = Destination::new("b", "B").with_location("zzz");
        f.store.upsert(&[a, b]).unwrap();
        f.probe.simulate(SimulatedConditions::offline());

        let below = |value: Value| QueryFilter {
            field: "location".into(),
            op: FilterOp::LessThan,
            value,
        };
        let found = f.resolver.browse(&[below(json!("aaa"))], 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        // A number never orders against a string.
        assert!(f.resolver.browse(&[below(json!(5))], 10).await.unwrap().is_empty());

        let above = QueryFilter {
            field: "location".into(),
            op: FilterOp::GreaterThan,
            value: json!("m"),
        };
        let found = f.resolver.browse(&[above], 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");
    }

    #[test]
    fn numbers_compare_numerically() {
        use std::cmp::Ordering::Less;
        assert_eq!(compare(&json!(2), &json!(10.5)), Some(Less));
        assert_eq!(compare(&json!("10"), &json!("2")), Some(Less));
        assert_eq!(compare(&json!(true), &json!(false)), None);
    }

    #[tokio::test]
    async fn browse_falls_back_to_local_on_remote_failure() {
        let f = fixture(FakeRemote {
            fail: true,
            ..Default::default()
        });
        f.store.upsert_one(&Destination::new("red_fort", "Red Fort")).unwrap();
        let list = f.resolver.browse(&[], 10).await.unwrap();
        assert_eq!(list.len(), 1);
    }
}
