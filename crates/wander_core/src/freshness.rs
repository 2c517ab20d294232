//! TTL bookkeeping per `(kind, entity id)`, independent of the payload.
//!
//! A missing record means "never refreshed" and is always expired. Records are
//! only written after a successful remote operation.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::config::{FreshnessKind, FreshnessPolicy};
use crate::error::WanderError;
use crate::persistence::Database;

pub struct FreshnessTracker {
    db: Arc<Database>,
    policy: FreshnessPolicy,
}

impl FreshnessTracker {
    pub fn new(db: Arc<Database>, policy: FreshnessPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> FreshnessPolicy {
        self.policy
    }

    /// Last successful refresh, if any.
    pub fn last_refresh(
        &self,
        kind: FreshnessKind,
        id: &str,
    ) -> Result<Option<DateTime<Utc>>, WanderError> {
        let row = self
            .db
            .get_freshness(kind.as_str(), id)
            .map_err(|e| WanderError::store(format!("{e:#}")))?;
        Ok(row.and_then(|r| Utc.timestamp_millis_opt(r.refreshed_at).single()))
    }

    pub fn is_expired(&self, kind: FreshnessKind, id: &str) -> Result<bool, WanderError> {
        self.is_expired_at(kind, id, Utc::now())
    }

    pub fn is_expired_at(
        &self,
        kind: FreshnessKind,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, WanderError> {
        Ok(match self.last_refresh(kind, id)? {
            None => true,
            Some(last) => now - last > self.policy.ttl(kind),
        })
    }

    /// Call only after a successful remote fetch or enrichment.
    pub fn mark_fresh(&self, kind: FreshnessKind, id: &str) -> Result<(), WanderError> {
        self.mark_fresh_at(kind, id, Utc::now())
    }

    pub fn mark_fresh_at(
        &self,
        kind: FreshnessKind,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WanderError> {
        self.db
            .set_freshness(kind.as_str(), id, at.timestamp_millis())
            .map_err(|e| WanderError::store(format!("{e:#}")))?;
        debug!(%kind, entity_id = %id, "Marked fresh");
        Ok(())
    }

    /// Whole minutes since the last refresh, or `None` if never refreshed.
    pub fn age_minutes(&self, kind: FreshnessKind, id: &str) -> Result<Option<i64>, WanderError> {
        self.age_minutes_at(kind, id, Utc::now())
    }

    pub fn age_minutes_at(
        &self,
        kind: FreshnessKind,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, WanderError> {
        Ok(self
            .last_refresh(kind, id)?
            .map(|last| (now - last).num_minutes().max(0)))
    }

    /// Forget a refresh so the next check reports expired.
    pub fn invalidate(&self, kind: FreshnessKind, id: &str) -> Result<(), WanderError> {
        self.db
            .delete_freshness(kind.as_str(), id)
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }

    pub fn clear(&self) -> Result<(), WanderError> {
        self.db
            .clear_freshness()
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }
}
