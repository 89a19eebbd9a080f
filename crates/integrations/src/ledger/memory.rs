//! In-memory ledger implementation
//!
//! Used in tests and as a reference for the [`Ledger`] contract; real
//! deployments use [`super::SqliteLedger`] so pending work survives
//! restarts.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use super::Ledger;
use crate::models::WorkItem;

/// HashMap-backed ledger behind an RwLock
#[derive(Default)]
pub struct InMemoryLedger {
    items: RwLock<HashMap<(String, String), Option<Value>>>,
}

impl InMemoryLedger {
    /// Create a new empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of pending items across all categories
    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    /// Whether no items are pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for InMemoryLedger {
    fn upsert(&self, category: &str, entity_id: &str, payload: Option<Value>) -> Result<()> {
        let mut items = self.items.write().unwrap();
        items.insert((category.to_string(), entity_id.to_string()), payload);
        Ok(())
    }

    fn remove(&self, category: &str, entity_id: &str) -> Result<()> {
        let mut items = self.items.write().unwrap();
        items.remove(&(category.to_string(), entity_id.to_string()));
        Ok(())
    }

    fn scan(&self, category: &str) -> Result<Vec<WorkItem>> {
        let items = self.items.read().unwrap();
        let mut matching: Vec<WorkItem> = items
            .iter()
            .filter(|((c, _), _)| c == category)
            .map(|((c, id), payload)| WorkItem {
                category: c.clone(),
                entity_id: id.clone(),
                payload: payload.clone(),
            })
            .collect();
        // Stable order keeps logs and tests deterministic
        matching.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_is_idempotent_and_last_write_wins() {
        let ledger = InMemoryLedger::new();
        ledger.upsert("c", "1", Some(json!({"v": 1}))).unwrap();
        ledger.upsert("c", "1", Some(json!({"v": 2}))).unwrap();

        let items = ledger.scan("c").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload, Some(json!({"v": 2})));
    }

    #[test]
    fn test_remove_absent_is_not_an_error() {
        let ledger = InMemoryLedger::new();
        ledger.remove("c", "missing").unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_scan_is_partitioned_by_category() {
        let ledger = InMemoryLedger::new();
        ledger.upsert("a", "1", None).unwrap();
        ledger.upsert("b", "1", None).unwrap();
        ledger.upsert("b", "2", None).unwrap();

        assert_eq!(ledger.scan("a").unwrap().len(), 1);
        assert_eq!(ledger.scan("b").unwrap().len(), 2);
        assert!(ledger.scan("c").unwrap().is_empty());
    }

    #[test]
    fn test_remove_clears_one_identity() {
        let ledger = InMemoryLedger::new();
        ledger.upsert("c", "1", None).unwrap();
        ledger.upsert("c", "2", None).unwrap();
        ledger.remove("c", "1").unwrap();

        let items = ledger.scan("c").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].entity_id, "2");
    }
}
