//! Target-system (workforce portal) REST integration

mod client;

pub use client::PortalClient;

use anyhow::Result;
use serde_json::Value;

/// Operations the engine needs from the target system.
///
/// Statuses are data: the portal answers 404 for an unknown worker and the
/// engine branches on that, so non-2xx must not surface as errors.
pub trait TargetSystem: Send + Sync {
    /// Register a worker
    fn create_worker(&self, body: &Value) -> Result<(u16, Value)>;

    /// Fetch a worker by its (prefixed) external id
    fn get_worker(&self, id: &str) -> Result<(u16, Value)>;

    /// Fire a side-effect action for a worker (notifications and the like).
    /// Callers treat this as best-effort.
    fn trigger_action(&self, id: &str, body: &Value) -> Result<(u16, Value)>;

    /// Fetch a vacancy
    fn get_vacancy(&self, id: i64) -> Result<(u16, Value)>;

    /// Fetch the prospects attached to a vacancy
    fn vacancy_prospects(&self, id: i64) -> Result<(u16, Value)>;

    /// Submit a worker placement against a vacancy
    fn place_worker(&self, body: &Value) -> Result<(u16, Value)>;

    /// Move a prospect to a new status
    fn update_prospect_status(&self, id: i64, status: &str) -> Result<(u16, Value)>;
}
