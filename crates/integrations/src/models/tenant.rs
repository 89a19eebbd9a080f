//! Tenant integration configuration
//!
//! One [`IntegrationConfig`] pairs a source-side ATS with a target-side
//! workforce portal. Records are static, externally supplied, and read-only
//! to the engine; the surrounding application owns loading and reloading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Tenants filename in the service config directory
const TENANTS_FILE: &str = "tenants.json";

/// One configured pairing of a source and target system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    /// Display name, used in logs only
    pub name: String,
    /// Opaque shared secret identifying this tenant on the webhook boundary
    pub webhook_token: String,
    /// Fixed cadence for this tenant's discovery/reconciliation ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    pub ats: AtsConfig,
    pub portal: PortalConfig,
}

/// Source-system (ATS) credentials and category options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsConfig {
    /// OAuth base URL, also the base the session login is derived from
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub redirect_uri: String,
    /// Prefix tagging this system's candidate ids on the portal side
    pub worker_prefix: String,
    /// Candidate fields fetched when registering a worker
    #[serde(default = "default_candidate_fields")]
    pub candidate_fields: Vec<String>,
    /// Placement status that qualifies a status change for worker creation
    #[serde(default = "default_accepted_placement_status")]
    pub accepted_placement_status: String,
    pub mappings: Mappings,
}

/// Field-mapping dictionaries between the two record shapes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mappings {
    /// Source candidate path -> target worker path; see [`crate::mapper`]
    #[serde(default)]
    pub candidate_to_worker: HashMap<String, String>,
}

/// Target-system (portal) endpoint and options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalConfig {
    pub external_api: String,
    pub api_key: String,
    /// Prefix tagging portal vacancy ids inside source-side external ids
    #[serde(default = "default_vacancy_prefix")]
    pub vacancy_prefix: String,
    /// Static overlay applied to inbound candidate updates (for example a
    /// fixed country id the portal does not carry)
    #[serde(default)]
    pub candidate_defaults: Option<Value>,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_candidate_fields() -> Vec<String> {
    ["id", "firstName", "lastName", "email", "mobile", "address"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_accepted_placement_status() -> String {
    "Approved".to_string()
}

fn default_vacancy_prefix() -> String {
    "ENG-".to_string()
}

impl IntegrationConfig {
    /// Load every configured tenant from the service config directory
    pub fn load_all() -> Result<Vec<Self>> {
        config::load_json(TENANTS_FILE).context("Failed to load tenant registry")
    }

    /// Load tenants from an arbitrary JSON file
    pub fn load_file(path: &Path) -> Result<Vec<Self>> {
        config::load_json_file(path)
    }
}

impl AtsConfig {
    /// The portal-side id for a source candidate (`PREFIX-<id>`)
    pub fn prefixed_worker_id(&self, candidate_id: i64) -> String {
        format!("{}{}", self.worker_prefix, candidate_id)
    }

    /// Strip the worker prefix off a portal-side id
    pub fn strip_worker_prefix<'a>(&self, worker_id: &'a str) -> &'a str {
        worker_id.strip_prefix(&self.worker_prefix).unwrap_or(worker_id)
    }

    /// The worker field that carries the prefixed identity, per the mapping
    pub fn worker_id_field(&self) -> &str {
        self.mappings
            .candidate_to_worker
            .get("id")
            .map(String::as_str)
            .unwrap_or("id")
    }
}

impl PortalConfig {
    /// The source-side external id for a portal vacancy (`PREFIX-<id>`)
    pub fn external_id(&self, vacancy_id: i64) -> String {
        format!("{}{}", self.vacancy_prefix, vacancy_id)
    }

    /// Parse a source-side external id back into a vacancy id.
    /// Returns `None` for ids that do not belong to this portal.
    pub fn parse_external_id(&self, external_id: &str) -> Option<i64> {
        external_id.strip_prefix(&self.vacancy_prefix)?.parse().ok()
    }
}
