//! Online/offline detection with a short-lived result cache.
//!
//! Probing is single-flight: concurrent callers during a probe wait for it and
//! share its result. A probe that errors or exceeds its deadline counts as
//! offline; callers never see an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::WanderConfig;
use crate::types::ConnectivitySnapshot;

// ---------------------------------------------------------------------------
// Reachability check
// ---------------------------------------------------------------------------

/// One network round trip that answers "can we reach the outside world".
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn check(&self) -> bool;
}

/// Reachability via a tiny HTTP GET (a `generate_204`-style endpoint).
pub struct HttpReachability {
    url: String,
    client: reqwest::Client,
}

impl HttpReachability {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Reachability for HttpReachability {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Reachability check failed: {e}");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation override
// ---------------------------------------------------------------------------

/// Deterministic network conditions for tests and demos. Always wins over a
/// real probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedConditions {
    pub force_offline: bool,
    /// Extra delay added to every probe.
    pub latency: Option<Duration>,
}

impl SimulatedConditions {
    pub fn offline() -> Self {
        Self {
            force_offline: true,
            latency: None,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            force_offline: false,
            latency: Some(latency),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectivityProbe
// ---------------------------------------------------------------------------

pub struct ConnectivityProbe {
    reachability: Arc<dyn Reachability>,
    timeout: Duration,
    cache_window: Duration,
    snapshot: RwLock<Option<ConnectivitySnapshot>>,
    simulation: RwLock<SimulatedConditions>,
    probe_gate: tokio::sync::Mutex<()>,
    /// Real probes issued (simulated offline answers are not counted).
    probes_issued: AtomicU64,
}

impl ConnectivityProbe {
    pub fn new(
        reachability: Arc<dyn Reachability>,
        timeout: Duration,
        cache_window: Duration,
    ) -> Self {
        Self {
            reachability,
            timeout,
            cache_window,
            snapshot: RwLock::new(None),
            simulation: RwLock::new(SimulatedConditions::default()),
            probe_gate: tokio::sync::Mutex::new(()),
            probes_issued: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &WanderConfig) -> Self {
        let reach = HttpReachability::new(config.probe_url.clone(), config.probe_timeout());
        Self::new(
            Arc::new(reach),
            config.probe_timeout(),
            config.connectivity_cache_window(),
        )
    }

    /// Cached answer if still inside the cache window, otherwise a bounded probe.
    pub async fn is_online(&self) -> bool {
        if let Some(online) = self.fresh_cached() {
            return online;
        }

        let _gate = self.probe_gate.lock().await;
        // Another caller may have finished a probe while we waited.
        if let Some(online) = self.fresh_cached() {
            return online;
        }

        let (online, simulated) = self.probe().await;
        *self.snapshot.write() = Some(ConnectivitySnapshot {
            online,
            checked_at: tokio::time::Instant::now(),
            simulated,
        });
        online
    }

    /// Last known value without probing; `None` if nothing is known yet.
    pub fn is_online_cached(&self) -> Option<bool> {
        if self.simulation.read().force_offline {
            return Some(false);
        }
        self.snapshot.read().map(|s| s.online)
    }

    pub fn snapshot(&self) -> Option<ConnectivitySnapshot> {
        *self.snapshot.read()
    }

    /// Drop the cached result so the next `is_online` probes again.
    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
    }

    /// Replace the simulation override. Invalidates the cached result.
    pub fn simulate(&self, conditions: SimulatedConditions) {
        *self.simulation.write() = conditions;
        self.invalidate();
        info!(?conditions, "Connectivity simulation updated");
    }

    pub fn clear_simulation(&self) {
        self.simulate(SimulatedConditions::default());
    }

    pub fn simulation(&self) -> SimulatedConditions {
        *self.simulation.read()
    }

    pub fn probes_issued(&self) -> u64 {
        self.probes_issued.load(Ordering::Relaxed)
    }

    fn fresh_cached(&self) -> Option<bool> {
        self.snapshot
            .read()
            .filter(|s| s.is_fresh(self.cache_window))
            .map(|s| s.online)
    }

    async fn probe(&self) -> (bool, bool) {
        let sim = self.simulation();
        if let Some(latency) = sim.latency {
            tokio::time::sleep(latency).await;
        }
        if sim.force_offline {
            debug!("Connectivity forced offline by simulation");
            return (false, true);
        }

        self.probes_issued.fetch_add(1, Ordering::Relaxed);
        let online = match tokio::time::timeout(self.timeout, self.reachability.check()).await {
            Ok(online) => online,
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "Connectivity probe timed out");
                false
            }
        };
        debug!(online, "Connectivity probed");
        (online, sim.latency.is_some())
    }
}
