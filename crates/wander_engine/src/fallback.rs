//! Multi-Provider Resolver
//!
//! Tries an ordered list of tiers for one entity until one produces a value.
//! Recoverable tier errors are logged and skipped; store corruption is
//! propagated. Tracks per-tier health so a tier that keeps failing or was
//! rate-limited sits out a cooldown instead of being hammered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wander_core::WanderError;

// ---------------------------------------------------------------------------
// Tier boundary
// ---------------------------------------------------------------------------

/// One source in a fallback chain. `Ok(None)` is a miss; an empty value
/// must be reported as a miss, never as a result.
#[async_trait]
pub trait ResolutionTier<H, T>: Send + Sync
where
    H: Send + Sync,
    T: Send,
{
    fn name(&self) -> &str;

    async fn attempt(&self, entity_id: &str, hints: &H) -> Result<Option<T>, WanderError>;
}

/// Result of running a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Resolved { value: T, provider: String },
    Unresolved,
}

impl<T> Resolution<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Resolved { value, .. } => Some(value),
            Self::Unresolved => None,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Resolved { provider, .. } => Some(provider),
            Self::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

// ---------------------------------------------------------------------------
// Health tracking
// ---------------------------------------------------------------------------

/// Why a tier failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    RateLimit,
    Timeout,
    Unauthorized,
    ServerError,
    Unavailable,
}

impl FailureReason {
    /// Classify an error message.
    pub fn from_error(error: &str) -> Self {
        let lower = error.to_lowercase();
        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
        {
            Self::RateLimit
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("permission")
        {
            Self::Unauthorized
        } else if lower.contains("500") || lower.contains("502") || lower.contains("503") {
            Self::ServerError
        } else {
            Self::Unavailable
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TierStatus {
    pub consecutive_failures: u32,
    pub cooling_until: Option<Instant>,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Consecutive failures before a tier starts a cooldown.
    pub max_consecutive_failures: u32,
    pub rate_limit_cooldown: Duration,
    pub failure_cooldown: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            rate_limit_cooldown: Duration::from_secs(60),
            failure_cooldown: Duration::from_secs(30),
        }
    }
}

/// A recorded fall-through for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackEvent {
    /// Milliseconds since the resolver was created.
    pub age_ms: u64,
    pub entity_id: String,
    pub provider: String,
    pub reason: FallbackEventReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackEventReason {
    Failed(FailureReason),
    CoolingDown,
}

const HISTORY_CAP: usize = 1000;
const HISTORY_KEEP: usize = 500;

// ---------------------------------------------------------------------------
// MultiProviderResolver
// ---------------------------------------------------------------------------

pub struct MultiProviderResolver<H, T> {
    label: &'static str,
    tiers: Vec<Arc<dyn ResolutionTier<H, T>>>,
    status: RwLock<HashMap<String, TierStatus>>,
    config: HealthConfig,
    history: RwLock<Vec<FallbackEvent>>,
    created_at: Instant,
}

impl<H, T> MultiProviderResolver<H, T>
where
    H: Send + Sync,
    T: Send,
{
    pub fn new(label: &'static str, tiers: Vec<Arc<dyn ResolutionTier<H, T>>>) -> Self {
        Self::with_config(label, tiers, HealthConfig::default())
    }

    pub fn with_config(
        label: &'static str,
        tiers: Vec<Arc<dyn ResolutionTier<H, T>>>,
        config: HealthConfig,
    ) -> Self {
        Self {
            label,
            tiers,
            status: RwLock::new(HashMap::new()),
            config,
            history: RwLock::new(Vec::new()),
            created_at: Instant::now(),
        }
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name().to_string()).collect()
    }

    /// Try each tier in order; first hit wins.
    pub async fn resolve(&self, entity_id: &str, hints: &H) -> Result<Resolution<T>, WanderError> {
        for tier in &self.tiers {
            let name = tier.name();
            if !self.is_available(name) {
                debug!(resolver = self.label, provider = name, entity_id, "Tier cooling down, skipped");
                self.record_event(entity_id, name, FallbackEventReason::CoolingDown);
                continue;
            }

            debug!(resolver = self.label, provider = name, entity_id, "Trying tier");
            match tier.attempt(entity_id, hints).await {
                Ok(Some(value)) => {
                    self.record_success(name);
                    info!(resolver = self.label, provider = name, entity_id, "Resolved");
                    return Ok(Resolution::Resolved {
                        value,
                        provider: name.to_string(),
                    });
                }
                Ok(None) => {
                    debug!(resolver = self.label, provider = name, entity_id, "Tier miss");
                }
                Err(e) if e.is_recoverable() => {
                    let reason = FailureReason::from_error(&e.to_string());
                    warn!(
                        resolver = self.label,
                        provider = name,
                        entity_id,
                        error = %e,
                        ?reason,
                        "Tier failed, falling through"
                    );
                    self.record_failure(name, reason, &e.to_string());
                    self.record_event(entity_id, name, FallbackEventReason::Failed(reason));
                }
                Err(e) => {
                    warn!(resolver = self.label, provider = name, entity_id, error = %e, "Tier failed fatally");
                    return Err(e);
                }
            }
        }

        debug!(resolver = self.label, entity_id, "All tiers exhausted");
        Ok(Resolution::Unresolved)
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    pub fn is_available(&self, name: &str) -> bool {
        let map = self.status.read();
        match map.get(name).and_then(|s| s.cooling_until) {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    fn record_success(&self, name: &str) {
        let mut map = self.status.write();
        let status = map.entry(name.to_string()).or_default();
        status.consecutive_failures = 0;
        status.cooling_until = None;
        status.last_success = Some(Instant::now());
        status.last_error = None;
    }

    fn record_failure(&self, name: &str, reason: FailureReason, error: &str) {
        let now = Instant::now();
        let mut map = self.status.write();
        let status = map.entry(name.to_string()).or_default();
        status.consecutive_failures += 1;
        status.last_failure = Some(now);
        status.last_error = Some(error.to_string());

        if reason == FailureReason::RateLimit {
            status.cooling_until = Some(now + self.config.rate_limit_cooldown);
            warn!(
                provider = name,
                cooldown_secs = self.config.rate_limit_cooldown.as_secs(),
                "Provider rate-limited"
            );
        } else if status.consecutive_failures >= self.config.max_consecutive_failures {
            status.cooling_until = Some(now + self.config.failure_cooldown);
            warn!(
                provider = name,
                failures = status.consecutive_failures,
                "Provider cooling down after consecutive failures"
            );
        }
    }

    fn record_event(&self, entity_id: &str, provider: &str, reason: FallbackEventReason) {
        let event = FallbackEvent {
            age_ms: self.created_at.elapsed().as_millis() as u64,
            entity_id: entity_id.to_string(),
            provider: provider.to_string(),
            reason,
        };
        let mut history = self.history.write();
        history.push(event);
        if history.len() > HISTORY_CAP {
            let drain_end = history.len() - HISTORY_KEEP;
            history.drain(..drain_end);
        }
    }

    pub fn tier_statuses(&self) -> HashMap<String, TierStatus> {
        self.status.read().clone()
    }

    pub fn fallback_history(&self) -> Vec<FallbackEvent> {
        self.history.read().clone()
    }

    /// Forget all failures and cooldowns.
    pub fn reset_health(&self) {
        self.status.write().clear();
        info!(resolver = self.label, "Tier health reset");
    }
}
