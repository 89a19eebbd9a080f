//! Workforce-portal HTTP client
//!
//! API-key authenticated; no session state, so no retry wrapper is needed
//! on this side.

use anyhow::{Context, Result};
use serde_json::Value;
use ureq::Agent;

use super::TargetSystem;
use crate::ats::build_agent;
use crate::models::PortalConfig;

const API_KEY_HEADER: &str = "x-api-key";

/// Portal REST client, one per tenant
pub struct PortalClient {
    agent: Agent,
    config: PortalConfig,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Self {
        Self {
            agent: build_agent(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.external_api, path)
    }

    fn get(&self, path: &str) -> Result<(u16, Value)> {
        let response = self
            .agent
            .get(&self.url(path))
            .header(API_KEY_HEADER, &self.config.api_key)
            .call()
            .context("Portal request failed")?;
        read_value(response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<(u16, Value)> {
        let response = self
            .agent
            .post(&self.url(path))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send_json(body)
            .context("Portal request failed")?;
        read_value(response)
    }

    fn put(&self, path: &str) -> Result<(u16, Value)> {
        let response = self
            .agent
            .put(&self.url(path))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send_empty()
            .context("Portal request failed")?;
        read_value(response)
    }
}

fn read_value(mut response: ureq::http::Response<ureq::Body>) -> Result<(u16, Value)> {
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .context("Failed to read portal response body")?;
    if text.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    match serde_json::from_str(&text) {
        Ok(body) => Ok((status, body)),
        Err(error) if (200..300).contains(&status) => {
            Err(error).context("Failed to parse portal response body")
        }
        Err(_) => Ok((status, Value::Null)),
    }
}

impl TargetSystem for PortalClient {
    fn create_worker(&self, body: &Value) -> Result<(u16, Value)> {
        self.post("workers", body)
    }

    fn get_worker(&self, id: &str) -> Result<(u16, Value)> {
        self.get(&format!("workers/{id}"))
    }

    fn trigger_action(&self, id: &str, body: &Value) -> Result<(u16, Value)> {
        self.post(&format!("workers/{id}/actions"), body)
    }

    fn get_vacancy(&self, id: i64) -> Result<(u16, Value)> {
        self.get(&format!("vacancies/{id}"))
    }

    fn vacancy_prospects(&self, id: i64) -> Result<(u16, Value)> {
        self.get(&format!("vacancies/{id}/prospects"))
    }

    fn place_worker(&self, body: &Value) -> Result<(u16, Value)> {
        self.post("vacancies/prospects", body)
    }

    fn update_prospect_status(&self, id: i64, status: &str) -> Result<(u16, Value)> {
        self.put(&format!("prospects/{id}/prospectstatus/{status}"))
    }
}
