//! Source-system (ATS) REST integration
//!
//! This module provides:
//! - Session acquisition via the three-leg credential exchange
//! - A shared per-tenant session store with atomic replacement
//! - The authenticating client that retries exactly once on a 401
//! - Typed envelopes for the event-subscription feed and search results

mod auth;
mod client;

pub use auth::{Authenticator, CredentialAuthenticator, Session, SessionStore};
pub use client::AtsClient;
pub(crate) use client::build_agent;

use anyhow::Result;
use serde_json::Value;

use api::{SearchResult, SubscriptionData};

/// Operations the engine needs from the source system.
///
/// Every call resolves to a status code and body; non-2xx statuses are
/// data, not errors, because the engine's retry policy is keyed on them.
pub trait SourceSystem: Send + Sync {
    /// Fetch one entity with a selected field set
    fn fetch_entity(&self, kind: &str, id: i64, fields: &[&str]) -> Result<(u16, Value)>;

    /// Full-text search over an entity kind
    fn search_entities(
        &self,
        kind: &str,
        fields: &[&str],
        query: &str,
    ) -> Result<(u16, SearchResult)>;

    /// Where-clause query over an entity kind
    fn query_entities(
        &self,
        kind: &str,
        fields: &[&str],
        where_clause: &str,
    ) -> Result<(u16, SearchResult)>;

    /// Create an entity
    fn create_entity(&self, kind: &str, body: &Value) -> Result<(u16, Value)>;

    /// Update fields of an existing entity
    fn update_entity(&self, kind: &str, id: i64, body: &Value) -> Result<(u16, Value)>;

    /// Drain pending events from a named subscription.
    ///
    /// Reading is destructive on the remote side: events are gone from the
    /// queue once fetched, so callers must persist extracted ids as part of
    /// the same logical step.
    fn poll_subscription_events(
        &self,
        name: &str,
        max_events: usize,
    ) -> Result<(u16, SubscriptionData)>;
}

/// Source-system wire envelopes
pub mod api {
    use serde::Deserialize;
    use serde_json::Value;

    /// One entry from the event-subscription feed
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SubscriptionEvent {
        pub entity_name: Option<String>,
        pub entity_id: Option<i64>,
        pub entity_event_type: Option<String>,
        #[serde(default)]
        pub updated_properties: Vec<String>,
    }

    /// Feed envelope; the remote answers an empty body when no events are
    /// pending
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SubscriptionData {
        pub request_id: Option<i64>,
        #[serde(default)]
        pub events: Vec<SubscriptionEvent>,
    }

    /// Envelope returned by the search and query operations
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SearchResult {
        /// Total matches (search)
        pub total: Option<i64>,
        /// Row count (query)
        pub count: Option<i64>,
        #[serde(default)]
        pub data: Vec<Value>,
    }
}
