//! Durable pending-update ledger
//!
//! The ledger holds one [`WorkItem`] per outstanding remote-side effect,
//! keyed by `(category, entity_id)`. Absence of an item is the only durable
//! signal of "done"; there is no separate success or failure record.
//!
//! No locking is provided across a scan-then-process sequence: a webhook
//! may upsert an item while a reconciliation pass is processing it. That
//! race is benign: the next pass simply re-verifies current truth.

mod memory;
mod sqlite;

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;

use anyhow::Result;
use serde_json::Value;

use crate::models::WorkItem;

/// Storage contract for pending work items
pub trait Ledger: Send + Sync {
    /// Record that an entity still needs reconciling. Idempotent; a second
    /// upsert for the same identity replaces the payload (last write wins).
    fn upsert(&self, category: &str, entity_id: &str, payload: Option<Value>) -> Result<()>;

    /// Remove a reconciled or abandoned item. Removing an absent item is
    /// not an error.
    fn remove(&self, category: &str, entity_id: &str) -> Result<()>;

    /// Snapshot of every pending item in a category. Items added or removed
    /// concurrently are not guaranteed to be reflected.
    fn scan(&self, category: &str) -> Result<Vec<WorkItem>>;
}
