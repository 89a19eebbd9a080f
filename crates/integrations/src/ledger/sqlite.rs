//! SQLite-backed ledger
//!
//! The durable implementation: pending work items survive process
//! restarts, so in-flight reconciliation state is never held only in
//! memory.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use rusqlite_migration::{M, Migrations};
use serde_json::Value;

use super::Ledger;
use crate::models::WorkItem;

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: the pending-update table
        M::up(
            r#"
            CREATE TABLE entity_updates (
                category TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                payload TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (category, entity_id)
            );

            CREATE INDEX idx_entity_updates_category
                ON entity_updates(category);
            "#,
        ),
    ])
}

/// SQLite-based ledger
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open ledger at {:?}", db_path.as_ref()))?;

        // WAL keeps webhook upserts and reconciliation scans from blocking
        // each other; NORMAL sync is safe in WAL mode.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run ledger migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Ledger for SqliteLedger {
    fn upsert(&self, category: &str, entity_id: &str, payload: Option<Value>) -> Result<()> {
        let encoded = payload.map(|p| p.to_string());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO entity_updates (category, entity_id, payload, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT (category, entity_id)
            DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
            params![category, entity_id, encoded],
        )
        .context("Failed to upsert work item")?;
        Ok(())
    }

    fn remove(&self, category: &str, entity_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entity_updates WHERE category = ?1 AND entity_id = ?2",
            params![category, entity_id],
        )
        .context("Failed to remove work item")?;
        Ok(())
    }

    fn scan(&self, category: &str) -> Result<Vec<WorkItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entity_id, payload FROM entity_updates
             WHERE category = ?1 ORDER BY entity_id",
        )?;

        let rows = stmt.query_map(params![category], |row| {
            let entity_id: String = row.get(0)?;
            let payload: Option<String> = row.get(1)?;
            Ok((entity_id, payload))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (entity_id, payload) = row?;
            items.push(WorkItem {
                category: category.to_string(),
                entity_id,
                payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
            });
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteLedger {
        SqliteLedger::new(dir.path().join("ledger.db")).unwrap()
    }

    #[test]
    fn test_upsert_replaces_payload() {
        let dir = TempDir::new().unwrap();
        let ledger = open(&dir);

        ledger.upsert("c", "1", Some(json!({"v": 1}))).unwrap();
        ledger.upsert("c", "1", Some(json!({"v": 2}))).unwrap();

        let items = ledger.scan("c").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload, Some(json!({"v": 2})));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ledger = open(&dir);

        ledger.upsert("c", "1", None).unwrap();
        ledger.remove("c", "1").unwrap();
        ledger.remove("c", "1").unwrap();

        assert!(ledger.scan("c").unwrap().is_empty());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let ledger = open(&dir);
            ledger
                .upsert("joborder:up", "42", Some(json!({"workerId": "BH-1"})))
                .unwrap();
        }

        let reopened = open(&dir);
        let items = reopened.scan("joborder:up").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].entity_id, "42");
        assert_eq!(items[0].payload, Some(json!({"workerId": "BH-1"})));
    }

    #[test]
    fn test_scan_ignores_other_categories() {
        let dir = TempDir::new().unwrap();
        let ledger = open(&dir);

        ledger.upsert("plac:ins", "1", None).unwrap();
        ledger.upsert("plac:status:up", "1", None).unwrap();

        assert_eq!(ledger.scan("plac:ins").unwrap().len(), 1);
        assert_eq!(ledger.scan("plac:status:up").unwrap().len(), 1);
    }
}
