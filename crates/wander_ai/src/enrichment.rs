//! Enrichment Gateway
//!
//! Runs the remote enrichment call at most once per TTL window per entity and
//! never while offline. Failures leave both the record and its freshness
//! untouched so the next eligible attempt retries. Only store corruption is
//! reported to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wander_core::{
    ConnectivityProbe, Destination, EntityStore, FreshnessKind, FreshnessTracker, WanderError,
};

use crate::providers::EnrichmentModel;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where an entity stands with respect to enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentState {
    Fresh,
    ExpiredOnline,
    ExpiredOffline,
}

/// What a `maybe_enrich` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Inside the TTL window; no call made.
    AlreadyFresh,
    /// Expired but offline; no call made.
    Offline,
    /// No enrichment model configured.
    Unavailable,
    Enriched,
    /// The remote call failed or timed out; nothing changed.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOutcome {
    pub destination: Destination,
    pub status: EnrichmentStatus,
}

impl EnrichmentOutcome {
    fn new(destination: Destination, status: EnrichmentStatus) -> Self {
        Self {
            destination,
            status,
        }
    }
}

struct LockEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    leases: usize,
}

type InFlight = Arc<Mutex<HashMap<String, LockEntry>>>;

/// A claim on one entity's lock. The entry leaves the map when the last
/// lease drops, including the lease of a caller cancelled while waiting.
struct EntityLease {
    in_flight: InFlight,
    id: String,
}

impl EntityLease {
    fn acquire(in_flight: &InFlight, id: &str) -> (Self, Arc<tokio::sync::Mutex<()>>) {
        let mut map = in_flight.lock();
        let entry = map.entry(id.to_string()).or_insert_with(|| LockEntry {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            leases: 0,
        });
        entry.leases += 1;
        let lock = Arc::clone(&entry.lock);
        let lease = Self {
            in_flight: Arc::clone(in_flight),
            id: id.to_string(),
        };
        (lease, lock)
    }
}

impl Drop for EntityLease {
    fn drop(&mut self) {
        let mut map = self.in_flight.lock();
        let idle = match map.get_mut(&self.id) {
            Some(entry) => {
                entry.leases = entry.leases.saturating_sub(1);
                entry.leases == 0
            }
            None => false,
        };
        if idle {
            map.remove(&self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct EnrichmentGateway {
    store: Arc<EntityStore>,
    freshness: Arc<FreshnessTracker>,
    connectivity: Arc<ConnectivityProbe>,
    model: Option<Arc<dyn EnrichmentModel>>,
    timeout: Duration,
    in_flight: InFlight,
    calls: Arc<AtomicU64>,
}

impl EnrichmentGateway {
    pub fn new(
        store: Arc<EntityStore>,
        freshness: Arc<FreshnessTracker>,
        connectivity: Arc<ConnectivityProbe>,
        model: Option<Arc<dyn EnrichmentModel>>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            freshness,
            connectivity,
            model,
            timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Remote enrichment calls issued so far.
    pub fn calls_issued(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Entities with an enrichment currently running or queued.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub async fn state(&self, id: &str) -> Result<EnrichmentState, WanderError> {
        if !self.freshness.is_expired(FreshnessKind::Enrichment, id)? {
            return Ok(EnrichmentState::Fresh);
        }
        if self.connectivity.is_online().await {
            Ok(EnrichmentState::ExpiredOnline)
        } else {
            Ok(EnrichmentState::ExpiredOffline)
        }
    }

    /// Enrich `dest` if its enrichment has expired and we are online.
    ///
    /// Concurrent calls for the same id share one remote call: later callers
    /// wait for the first and then find the record fresh. The remote call
    /// runs in its own task, so dropping this future does not cancel it.
    pub async fn maybe_enrich(&self, dest: Destination) -> Result<EnrichmentOutcome, WanderError> {
        if !self.freshness.is_expired(FreshnessKind::Enrichment, &dest.id)? {
            let current = self.store.get(&dest.id)?.unwrap_or(dest);
            return Ok(EnrichmentOutcome::new(current, EnrichmentStatus::AlreadyFresh));
        }
        if !self.connectivity.is_online().await {
            debug!(entity_id = %dest.id, "Offline, enrichment skipped");
            return Ok(EnrichmentOutcome::new(dest, EnrichmentStatus::Offline));
        }
        let Some(model) = self.model.clone() else {
            return Ok(EnrichmentOutcome::new(dest, EnrichmentStatus::Unavailable));
        };

        let (lease, entity_lock) = EntityLease::acquire(&self.in_flight, &dest.id);
        let guard = entity_lock.lock_owned().await;

        let task = EnrichTask {
            store: Arc::clone(&self.store),
            freshness: Arc::clone(&self.freshness),
            model,
            timeout: self.timeout,
            calls: Arc::clone(&self.calls),
        };
        let handle = tokio::spawn(async move {
            let result = task.run(dest).await;
            drop(guard);
            drop(lease);
            result
        });

        handle
            .await
            .map_err(|e| WanderError::unavailable(format!("enrichment task aborted: {e}")))?
    }
}

/// Owned state for one spawned enrichment.
struct EnrichTask {
    store: Arc<EntityStore>,
    freshness: Arc<FreshnessTracker>,
    model: Arc<dyn EnrichmentModel>,
    timeout: Duration,
    calls: Arc<AtomicU64>,
}

impl EnrichTask {
    async fn run(&self, mut dest: Destination) -> Result<EnrichmentOutcome, WanderError> {
        // Another caller may have finished while we waited for the lock.
        if !self.freshness.is_expired(FreshnessKind::Enrichment, &dest.id)? {
            let current = self.store.get(&dest.id)?.unwrap_or(dest);
            return Ok(EnrichmentOutcome::new(current, EnrichmentStatus::AlreadyFresh));
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        let fields = match tokio::time::timeout(self.timeout, self.model.enrich(&dest)).await {
            Ok(Ok(fields)) if !fields.is_empty() => fields,
            Ok(Ok(_)) => {
                warn!(entity_id = %dest.id, provider = self.model.name(), "Enrichment returned no fields");
                return Ok(EnrichmentOutcome::new(dest, EnrichmentStatus::Failed));
            }
            Ok(Err(e)) => {
                warn!(entity_id = %dest.id, provider = self.model.name(), error = %e, "Enrichment failed");
                return Ok(EnrichmentOutcome::new(dest, EnrichmentStatus::Failed));
            }
            Err(_) => {
                warn!(
                    entity_id = %dest.id,
                    provider = self.model.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Enrichment timed out"
                );
                return Ok(EnrichmentOutcome::new(dest, EnrichmentStatus::Failed));
            }
        };

        fields.apply_to(&mut dest);
        self.store.upsert_one(&dest)?;
        self.freshness.mark_fresh(FreshnessKind::Enrichment, &dest.id)?;
        info!(entity_id = %dest.id, provider = self.model.name(), "Destination enriched");
        Ok(EnrichmentOutcome::new(dest, EnrichmentStatus::Enriched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::types::EnrichedFields;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use wander_core::{Database, FreshnessPolicy, Provenance, Reachability, SimulatedConditions};

    struct AlwaysOnline;

    #[async_trait]
    impl Reachability for AlwaysOnline {
        async fn check(&self) -> bool {
            true
        }
    }

    struct MockEnricher {
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MockEnricher {
        fn new(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                fail,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EnrichmentModel for MockEnricher {
        fn name(&self) -> &str {
            "mock-enricher"
        }

        async fn enrich(&self, dest: &Destination) -> Result<EnrichedFields, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ProviderError::RateLimit);
            }
            Ok(EnrichedFields {
                description: Some(format!("{} is a famous monument.", dest.name)),
                ..Default::default()
            })
        }
    }

    struct Fixture {
        gateway: Arc<EnrichmentGateway>,
        store: Arc<EntityStore>,
        freshness: Arc<FreshnessTracker>,
        probe: Arc<ConnectivityProbe>,
    }

    fn fixture(model: Arc<MockEnricher>) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(EntityStore::new(Arc::clone(&db)));
        let freshness = Arc::new(FreshnessTracker::new(db, FreshnessPolicy::default()));
        let probe = Arc::new(ConnectivityProbe::new(
            Arc::new(AlwaysOnline),
            Duration::from_secs(3),
            Duration::from_secs(5),
        ));
        let gateway = Arc::new(EnrichmentGateway::new(
            Arc::clone(&store),
            Arc::clone(&freshness),
            Arc::clone(&probe),
            Some(model as Arc<dyn EnrichmentModel>),
            Duration::from_secs(20),
        ));
        Fixture {
            gateway,
            store,
            freshness,
            probe,
        }
    }

    fn taj() -> Destination {
        Destination::new("taj_mahal_001", "Taj Mahal").with_description("A tomb.")
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_a_no_op() {
        let model = MockEnricher::new(false, Duration::ZERO);
        let f = fixture(model.clone());

        let first = f.gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(first.status, EnrichmentStatus::Enriched);
        assert_eq!(first.destination.provenance, Provenance::Enriched);

        let second = f.gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(second.status, EnrichmentStatus::AlreadyFresh);
        assert_eq!(
            second.destination.description,
            "Taj Mahal is a famous monument."
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.gateway.calls_issued(), 1);
    }

    #[tokio::test]
    async fn failure_keeps_entity_expired_and_unchanged() {
        let model = MockEnricher::new(true, Duration::ZERO);
        let f = fixture(model.clone());
        f.store.upsert_one(&taj()).unwrap();

        let out = f.gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(out.status, EnrichmentStatus::Failed);
        assert!(f
            .freshness
            .is_expired(FreshnessKind::Enrichment, "taj_mahal_001")
            .unwrap());
        assert_eq!(
            f.store.get("taj_mahal_001").unwrap().unwrap().description,
            "A tomb."
        );

        // Next eligible attempt retries.
        f.gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn offline_skips_the_call() {
        let model = MockEnricher::new(false, Duration::ZERO);
        let f = fixture(model.clone());
        f.probe.simulate(SimulatedConditions::offline());

        let out = f.gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(out.status, EnrichmentStatus::Offline);
        assert_eq!(out.destination, taj());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.gateway.state("taj_mahal_001").await.unwrap(),
            EnrichmentState::ExpiredOffline
        );
    }

    #[tokio::test]
    async fn state_follows_freshness_and_connectivity() {
        let model = MockEnricher::new(false, Duration::ZERO);
        let f = fixture(model);
        assert_eq!(
            f.gateway.state("taj_mahal_001").await.unwrap(),
            EnrichmentState::ExpiredOnline
        );
        f.gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(
            f.gateway.state("taj_mahal_001").await.unwrap(),
            EnrichmentState::Fresh
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_call() {
        let model = MockEnricher::new(false, Duration::from_millis(200));
        let f = fixture(model.clone());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gateway = Arc::clone(&f.gateway);
            handles.push(tokio::spawn(async move { gateway.maybe_enrich(taj()).await }));
        }
        for h in handles {
            let out = h.await.unwrap().unwrap();
            assert_eq!(out.destination.description, "Taj Mahal is a famous monument.");
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.gateway.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let model = MockEnricher::new(false, Duration::from_secs(60));
        let f = fixture(model);

        let out = f.gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(out.status, EnrichmentStatus::Failed);
        assert!(f
            .freshness
            .is_expired(FreshnessKind::Enrichment, "taj_mahal_001")
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_still_populates_cache() {
        let model = MockEnricher::new(false, Duration::from_secs(1));
        let f = fixture(model.clone());

        let gateway = Arc::clone(&f.gateway);
        let caller = tokio::spawn(async move { gateway.maybe_enrich(taj()).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        caller.abort();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        let stored = f.store.get("taj_mahal_001").unwrap().unwrap();
        assert_eq!(stored.provenance, Provenance::Enriched);
        assert!(!f
            .freshness
            .is_expired(FreshnessKind::Enrichment, "taj_mahal_001")
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_does_not_leave_a_lock_behind() {
        let model = MockEnricher::new(false, Duration::from_secs(1));
        let f = fixture(model.clone());

        let gateway = Arc::clone(&f.gateway);
        let first = tokio::spawn(async move { gateway.maybe_enrich(taj()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let gateway = Arc::clone(&f.gateway);
        let waiter = tokio::spawn(async move { gateway.maybe_enrich(taj()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(f.gateway.in_flight(), 1);

        let out = first.await.unwrap().unwrap();
        assert_eq!(out.status, EnrichmentStatus::Enriched);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.gateway.in_flight(), 0);
    }

    #[tokio::test]
    async fn missing_model_reports_unavailable() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let gateway = EnrichmentGateway::new(
            Arc::new(EntityStore::new(Arc::clone(&db))),
            Arc::new(FreshnessTracker::new(db, FreshnessPolicy::default())),
            Arc::new(ConnectivityProbe::new(
                Arc::new(AlwaysOnline),
                Duration::from_secs(3),
                Duration::from_secs(5),
            )),
            None,
            Duration::from_secs(20),
        );
        let out = gateway.maybe_enrich(taj()).await.unwrap();
        assert_eq!(out.status, EnrichmentStatus::Unavailable);
    }
}
