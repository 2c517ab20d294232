//! Durable on-device store for full destination records.
//!
//! Source of truth while offline and write-through cache while online. Reads
//! never touch the network. Upserts replace the whole record.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::WanderError;
use crate::persistence::{Database, DestinationRow};
use crate::types::{Destination, Provenance};

pub struct EntityStore {
    db: Arc<Database>,
}

impl EntityStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns `Ok(None)` only when the record is genuinely absent. A record
    /// that exists but cannot be decoded is `StoreCorrupt`.
    pub fn get(&self, id: &str) -> Result<Option<Destination>, WanderError> {
        let row = self.db.get_destination(id).map_err(|e| {
            warn!(entity_id = %id, "Entity store read failed: {e:#}");
            WanderError::store(format!("{e:#}"))
        })?;
        row.map(decode_row).transpose()
    }

    pub fn upsert(&self, entities: &[Destination]) -> Result<(), WanderError> {
        if entities.is_empty() {
            return Ok(());
        }
        let now = Utc::now().timestamp_millis();
        let mut rows = Vec::with_capacity(entities.len());
        for entity in entities {
            if entity.id.trim().is_empty() {
                return Err(WanderError::store("refusing to store a record without an id"));
            }
            let payload = serde_json::to_string(entity).map_err(WanderError::store)?;
            rows.push(DestinationRow {
                id: entity.id.clone(),
                payload,
                provenance: entity.provenance.as_str().to_string(),
                updated_at: now,
            });
        }
        self.db.upsert_destinations(&rows).map_err(|e| {
            warn!("Entity store write failed: {e:#}");
            WanderError::store(format!("{e:#}"))
        })?;
        debug!(count = rows.len(), "Upserted destinations");
        Ok(())
    }

    pub fn upsert_one(&self, entity: &Destination) -> Result<(), WanderError> {
        self.upsert(std::slice::from_ref(entity))
    }

    /// Returns `true` if a record was removed.
    pub fn delete(&self, id: &str) -> Result<bool, WanderError> {
        self.db
            .delete_destination(id)
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }

    pub fn clear(&self) -> Result<(), WanderError> {
        self.db
            .clear_destinations()
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }

    /// Most recently updated records first.
    pub fn list(&self, limit: usize) -> Result<Vec<Destination>, WanderError> {
        let rows = self
            .db
            .list_destinations(limit)
            .map_err(|e| WanderError::store(format!("{e:#}")))?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Every record, most recently updated first.
    pub fn all(&self) -> Result<Vec<Destination>, WanderError> {
        self.list(usize::MAX)
    }

    pub fn len(&self) -> Result<usize, WanderError> {
        self.db
            .count_destinations()
            .map_err(|e| WanderError::store(format!("{e:#}")))
    }

    pub fn is_empty(&self) -> Result<bool, WanderError> {
        Ok(self.len()? == 0)
    }
}

fn decode_row(row: DestinationRow) -> Result<Destination, WanderError> {
    let mut dest: Destination = serde_json::from_str(&row.payload).map_err(|e| {
        warn!(entity_id = %row.id, "Stored destination payload is corrupt: {e}");
        WanderError::StoreCorrupt(format!("destination '{}': {e}", row.id))
    })?;
    dest.id = row.id;
    dest.provenance = Provenance::parse(&row.provenance).unwrap_or(Provenance::Local);
    Ok(dest)
}
