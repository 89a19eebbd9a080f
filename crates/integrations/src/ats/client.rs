//! Source-system REST client with transparent re-authentication
//!
//! Every operation runs under [`AtsClient::with_session`]: acquire a
//! session lazily, invoke the call, and if it answers 401 acquire a
//! brand-new session exactly once and retry a single time. Any other
//! status, including other 4xx/5xx, is returned to the caller as-is.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use ureq::Agent;

use super::api::{SearchResult, SubscriptionData};
use super::auth::{Authenticator, CredentialAuthenticator, Session, SessionStore};
use super::SourceSystem;
use crate::models::AtsConfig;

/// Header carrying the session token on entity operations
const SESSION_TOKEN_HEADER: &str = "X-Rest-Token";

/// Build the blocking HTTP agent shared by the clients.
///
/// Non-2xx statuses come back as values, not errors, and redirects stay
/// unfollowed so the credential exchange can read its redirect target.
pub(crate) fn build_agent() -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .timeout_global(Some(Duration::from_secs(30)))
        .build()
        .into()
}

/// Authenticating source-system client, one per tenant
pub struct AtsClient {
    agent: Agent,
    authenticator: Box<dyn Authenticator>,
    sessions: Arc<SessionStore>,
}

impl AtsClient {
    /// Create a client using the real credential exchange
    pub fn new(config: AtsConfig, sessions: Arc<SessionStore>) -> Self {
        let agent = build_agent();
        let authenticator = CredentialAuthenticator::new(agent.clone(), config);
        Self {
            agent,
            authenticator: Box::new(authenticator),
            sessions,
        }
    }

    /// Create a client with a custom session source (test seam)
    pub fn with_authenticator(
        authenticator: Box<dyn Authenticator>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            agent: build_agent(),
            authenticator,
            sessions,
        }
    }

    fn ensure_session(&self) -> Result<Arc<Session>> {
        if let Some(session) = self.sessions.current() {
            return Ok(session);
        }
        Ok(self.sessions.replace(self.authenticator.acquire()?))
    }

    /// Run a remote operation under the current session, re-authenticating
    /// at most once when it answers 401.
    ///
    /// Acquisition failures propagate; no backoff happens here; the
    /// scheduler's fixed cadence is the retry.
    pub fn with_session<T>(
        &self,
        op: impl Fn(&Session) -> Result<(u16, T)>,
    ) -> Result<(u16, T)> {
        let session = self.ensure_session()?;
        let (status, body) = op(&session)?;
        if status != 401 {
            return Ok((status, body));
        }
        let session = self.sessions.replace(self.authenticator.acquire()?);
        op(&session)
    }

    // --- raw request helpers ---

    fn get_value(&self, session: &Session, url: &str) -> Result<(u16, Value)> {
        let response = self
            .agent
            .get(url)
            .header(SESSION_TOKEN_HEADER, &session.rest_token)
            .call()
            .context("Request failed")?;
        read_value(response)
    }

    fn get_typed<T: DeserializeOwned + Default>(
        &self,
        session: &Session,
        url: &str,
    ) -> Result<(u16, T)> {
        let response = self
            .agent
            .get(url)
            .header(SESSION_TOKEN_HEADER, &session.rest_token)
            .call()
            .context("Request failed")?;
        read_typed(response)
    }

    fn put_value(&self, session: &Session, url: &str, body: &Value) -> Result<(u16, Value)> {
        let response = self
            .agent
            .put(url)
            .header(SESSION_TOKEN_HEADER, &session.rest_token)
            .send_json(body)
            .context("Request failed")?;
        read_value(response)
    }

    fn post_value(&self, session: &Session, url: &str, body: &Value) -> Result<(u16, Value)> {
        let response = self
            .agent
            .post(url)
            .header(SESSION_TOKEN_HEADER, &session.rest_token)
            .send_json(body)
            .context("Request failed")?;
        read_value(response)
    }
}

/// Read a response into a status code and dynamic body.
///
/// Unparseable bodies on non-2xx statuses (HTML error pages and the like)
/// collapse to `Null`; on a success status they are a real error.
fn read_value(mut response: ureq::http::Response<ureq::Body>) -> Result<(u16, Value)> {
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .context("Failed to read response body")?;
    if text.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    match serde_json::from_str(&text) {
        Ok(body) => Ok((status, body)),
        Err(error) if (200..300).contains(&status) => {
            Err(error).context("Failed to parse response body")
        }
        Err(_) => Ok((status, Value::Null)),
    }
}

/// Read a response into a typed envelope; empty and error bodies default
fn read_typed<T: DeserializeOwned + Default>(
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<(u16, T)> {
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .context("Failed to read response body")?;
    if !(200..300).contains(&status) || text.trim().is_empty() {
        return Ok((status, T::default()));
    }
    let parsed = serde_json::from_str(&text).context("Failed to parse response body")?;
    Ok((status, parsed))
}

impl SourceSystem for AtsClient {
    fn fetch_entity(&self, kind: &str, id: i64, fields: &[&str]) -> Result<(u16, Value)> {
        self.with_session(|session| {
            let url = format!(
                "{}entity/{}/{}?fields={}",
                session.rest_url,
                kind,
                id,
                fields.join(","),
            );
            self.get_value(session, &url)
        })
    }

    fn search_entities(
        &self,
        kind: &str,
        fields: &[&str],
        query: &str,
    ) -> Result<(u16, SearchResult)> {
        self.with_session(|session| {
            let url = format!(
                "{}search/{}?fields={}&query={}",
                session.rest_url,
                kind,
                fields.join(","),
                urlencoding::encode(query),
            );
            self.get_typed(session, &url)
        })
    }

    fn query_entities(
        &self,
        kind: &str,
        fields: &[&str],
        where_clause: &str,
    ) -> Result<(u16, SearchResult)> {
        self.with_session(|session| {
            let url = format!(
                "{}query/{}?fields={}&where={}",
                session.rest_url,
                kind,
                fields.join(","),
                urlencoding::encode(where_clause),
            );
            self.get_typed(session, &url)
        })
    }

    fn create_entity(&self, kind: &str, body: &Value) -> Result<(u16, Value)> {
        self.with_session(|session| {
            let url = format!("{}entity/{}", session.rest_url, kind);
            self.put_value(session, &url, body)
        })
    }

    fn update_entity(&self, kind: &str, id: i64, body: &Value) -> Result<(u16, Value)> {
        self.with_session(|session| {
            let url = format!("{}entity/{}/{}", session.rest_url, kind, id);
            self.post_value(session, &url, body)
        })
    }

    fn poll_subscription_events(
        &self,
        name: &str,
        max_events: usize,
    ) -> Result<(u16, SubscriptionData)> {
        self.with_session(|session| {
            let url = format!(
                "{}event/subscription/{}?maxEvents={}",
                session.rest_url, name, max_events,
            );
            self.get_typed(session, &url)
        })
    }
}
