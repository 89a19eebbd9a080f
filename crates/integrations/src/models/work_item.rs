//! Pending synchronization obligations

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pending synchronization obligation for one entity in one category.
///
/// Identity is `(category, entity_id)`. The payload is auxiliary context
/// captured when the item was discovered (for example the worker and
/// vacancy ids behind a submission-status change); a later upsert for the
/// same identity replaces it wholesale, it never merges.
///
/// Presence of an item in the ledger is the only durable signal that a
/// remote-side effect is still outstanding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub category: String,
    pub entity_id: String,
    pub payload: Option<Value>,
}

impl WorkItem {
    /// Create a work item without payload
    pub fn new(category: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            entity_id: entity_id.into(),
            payload: None,
        }
    }

    /// Create a work item carrying reconciliation context
    pub fn with_payload(
        category: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            category: category.into(),
            entity_id: entity_id.into(),
            payload: Some(payload),
        }
    }

    /// The entity id parsed as a numeric source-system id
    pub fn numeric_id(&self) -> Option<i64> {
        self.entity_id.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_has_no_payload() {
        let item = WorkItem::new("joborder:up", "42");
        assert_eq!(item.category, "joborder:up");
        assert_eq!(item.entity_id, "42");
        assert!(item.payload.is_none());
    }

    #[test]
    fn test_numeric_id() {
        assert_eq!(WorkItem::new("c", "42").numeric_id(), Some(42));
        assert_eq!(WorkItem::new("c", "not-a-number").numeric_id(), None);
    }

    #[test]
    fn test_serialization() {
        let item = WorkItem::with_payload("vac:sub:acc", "7", json!({"workerId": "BH-1"}));
        let encoded = serde_json::to_string(&item).unwrap();
        let decoded: WorkItem = serde_json::from_str(&encoded).unwrap();
        assert_eq!(item, decoded);
    }
}
