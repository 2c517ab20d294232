use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::WanderConfig;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A stored destination payload (JSON) with its provenance tag.
#[derive(Debug, Clone)]
pub struct DestinationRow {
    pub id: String,
    pub payload: String,
    pub provenance: String,
    /// Unix milliseconds.
    pub updated_at: i64,
}

/// Last successful refresh of `(kind, entity_id)`.
#[derive(Debug, Clone)]
pub struct FreshnessRow {
    pub kind: String,
    pub entity_id: String,
    /// Unix milliseconds.
    pub refreshed_at: i64,
}

/// A cached image resolution.
#[derive(Debug, Clone)]
pub struct ImageRow {
    pub entity_id: String,
    pub url: String,
    pub provider: String,
    /// Unix milliseconds.
    pub fetched_at: i64,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite database backing the entity store, freshness records and the image
/// cache. The single connection sits behind a mutex, so writes are serialized.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database at `~/.wander/wander.db`.
    pub fn open() -> Result<Self> {
        let db_path = WanderConfig::db_path()?;
        Self::open_at(db_path)
    }

    /// Opens (or creates) the database at the given path.
    pub fn open_at(path: PathBuf) -> Result<Self> {
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Opens an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS destinations (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                provenance TEXT NOT NULL DEFAULT 'local',
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS freshness (
                kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                refreshed_at INTEGER NOT NULL,
                PRIMARY KEY (kind, entity_id)
            );

            CREATE TABLE IF NOT EXISTS image_cache (
                entity_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                provider TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_destinations_updated
                ON destinations(updated_at);
            ",
        )?;
        Ok(())
    }

    /// Path-independent sanity check used when a caller suspects corruption.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    // -----------------------------------------------------------------------
    // Destinations
    // -----------------------------------------------------------------------

    pub fn get_destination(&self, id: &str) -> Result<Option<DestinationRow>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT id, payload, provenance, updated_at FROM destinations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(DestinationRow {
                        id: row.get(0)?,
                        payload: row.get(1)?,
                        provenance: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to read destination {id}"))?;
        Ok(row)
    }

    /// Upserts a batch of rows in one transaction.
    pub fn upsert_destinations(&self, rows: &[DestinationRow]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO destinations (id, payload, provenance, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     payload = excluded.payload,
                     provenance = excluded.provenance,
                     updated_at = excluded.updated_at",
            )?;
            for row in rows {
                stmt.execute(params![row.id, row.payload, row.provenance, row.updated_at])?;
            }
        }
        tx.commit().context("Failed to commit destination upsert")?;
        Ok(())
    }

    /// Lists destinations, most recently updated first.
    pub fn list_destinations(&self, limit: usize) -> Result<Vec<DestinationRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, payload, provenance, updated_at
             FROM destinations
             ORDER BY updated_at DESC, id ASC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok(DestinationRow {
                id: row.get(0)?,
                payload: row.get(1)?,
                provenance: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.context("Failed to read destination row")?);
        }
        Ok(result)
    }

    pub fn count_destinations(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM destinations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns `true` if a row was removed.
    pub fn delete_destination(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM destinations WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn clear_destinations(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM destinations", [])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Freshness
    // -----------------------------------------------------------------------

    pub fn get_freshness(&self, kind: &str, entity_id: &str) -> Result<Option<FreshnessRow>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT kind, entity_id, refreshed_at FROM freshness
                 WHERE kind = ?1 AND entity_id = ?2",
                params![kind, entity_id],
                |row| {
                    Ok(FreshnessRow {
                        kind: row.get(0)?,
                        entity_id: row.get(1)?,
                        refreshed_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_freshness(&self, kind: &str, entity_id: &str, refreshed_at: i64) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO freshness (kind, entity_id, refreshed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(kind, entity_id) DO UPDATE SET refreshed_at = excluded.refreshed_at",
            params![kind, entity_id, refreshed_at],
        )?;
        Ok(())
    }

    pub fn delete_freshness(&self, kind: &str, entity_id: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM freshness WHERE kind = ?1 AND entity_id = ?2",
            params![kind, entity_id],
        )?;
        Ok(())
    }

    pub fn clear_freshness(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM freshness", [])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Image cache
    // -----------------------------------------------------------------------

    pub fn get_image(&self, entity_id: &str) -> Result<Option<ImageRow>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT entity_id, url, provider, fetched_at FROM image_cache WHERE entity_id = ?1",
                params![entity_id],
                |row| {
                    Ok(ImageRow {
                        entity_id: row.get(0)?,
                        url: row.get(1)?,
                        provider: row.get(2)?,
                        fetched_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn put_image(&self, row: &ImageRow) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO image_cache (entity_id, url, provider, fetched_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_id) DO UPDATE SET
                 url = excluded.url,
                 provider = excluded.provider,
                 fetched_at = excluded.fetched_at",
            params![row.entity_id, row.url, row.provider, row.fetched_at],
        )?;
        Ok(())
    }

    pub fn delete_image(&self, entity_id: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM image_cache WHERE entity_id = ?1", params![entity_id])?;
        Ok(())
    }

    pub fn clear_images(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM image_cache", [])?;
        Ok(())
    }
}

/// Convenience for tests and tools that want a throwaway on-disk database.
pub fn open_in_dir(dir: &Path) -> Result<Database> {
    Database::open_at(dir.join("wander.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, updated_at: i64) -> DestinationRow {
        DestinationRow {
            id: id.into(),
            payload: format!(r#"{{"name":"{id}"}}"#),
            provenance: "remote".into(),
            updated_at,
        }
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_destinations(&[row("a", 1)]).unwrap();
        let mut updated = row("a", 2);
        updated.payload = r#"{"name":"A2"}"#.into();
        db.upsert_destinations(&[updated]).unwrap();

        let got = db.get_destination("a").unwrap().unwrap();
        assert_eq!(got.payload, r#"{"name":"A2"}"#);
        assert_eq!(got.updated_at, 2);
        assert_eq!(db.count_destinations().unwrap(), 1);
    }

    #[test]
    fn list_orders_by_recency() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_destinations(&[row("old", 1), row("new", 5), row("mid", 3)])
            .unwrap();
        let ids: Vec<String> = db
            .list_destinations(10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(db.list_destinations(1).unwrap().len(), 1);
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_destinations(&[row("a", 1)]).unwrap();
        assert!(db.delete_destination("a").unwrap());
        assert!(!db.delete_destination("a").unwrap());
    }

    #[test]
    fn freshness_upsert_and_delete() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_freshness("enrichment", "a").unwrap().is_none());
        db.set_freshness("enrichment", "a", 10).unwrap();
        db.set_freshness("enrichment", "a", 20).unwrap();
        assert_eq!(
            db.get_freshness("enrichment", "a").unwrap().unwrap().refreshed_at,
            20
        );
        assert!(db.get_freshness("weather", "a").unwrap().is_none());
        db.delete_freshness("enrichment", "a").unwrap();
        assert!(db.get_freshness("enrichment", "a").unwrap().is_none());
    }

    #[test]
    fn image_rows_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let db = open_in_dir(tmp.path()).unwrap();
            db.put_image(&ImageRow {
                entity_id: "taj".into(),
                url: "https://img.example/taj.jpg".into(),
                provider: "wikipedia".into(),
                fetched_at: 42,
            })
            .unwrap();
        }
        let db = open_in_dir(tmp.path()).unwrap();
        let img = db.get_image("taj").unwrap().unwrap();
        assert_eq!(img.provider, "wikipedia");
        assert!(db.integrity_check().unwrap());
    }
}
