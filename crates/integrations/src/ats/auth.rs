//! Source-system session acquisition
//!
//! The credential exchange is a three-leg flow: an authorization request
//! answered with a redirect carrying a one-time code, a token exchange,
//! and a login call that mints the session token together with the REST
//! base URL that session must use.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use ureq::Agent;
use url::Url;

use crate::models::AtsConfig;

/// A live source-system session: short-lived token plus the REST base
/// derived for it. Never mutated; replaced wholesale on re-authentication.
#[derive(Debug, Clone)]
pub struct Session {
    pub rest_token: String,
    pub rest_url: String,
}

/// Owns the current session for one tenant.
///
/// Every engine for the tenant shares one store. Replacement is an atomic
/// swap of the whole session; concurrent refreshes are tolerated (the
/// remote accepts multiple live credential exchanges) rather than
/// serialized, and the last writer wins.
#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<Arc<Session>>>,
}

impl SessionStore {
    /// Create an empty store; the first call acquires lazily
    pub fn new() -> Self {
        Self::default()
    }

    /// The current session, if one has been acquired
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.read().unwrap().clone()
    }

    /// Swap in a freshly acquired session
    pub fn replace(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        *self.current.write().unwrap() = Some(session.clone());
        session
    }
}

/// Acquires a brand-new session from tenant credentials
pub trait Authenticator: Send + Sync {
    fn acquire(&self) -> Result<Session>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    rest_token: String,
    rest_url: String,
}

/// The real credential exchange against the ATS OAuth endpoints
pub struct CredentialAuthenticator {
    agent: Agent,
    config: AtsConfig,
}

impl CredentialAuthenticator {
    pub fn new(agent: Agent, config: AtsConfig) -> Self {
        Self { agent, config }
    }

    /// Leg 1: the authorization request answers with a redirect whose
    /// query string carries the one-time code. The agent must not follow
    /// redirects for this to be readable.
    fn request_auth_code(&self) -> Result<String> {
        let url = format!(
            "{}/oauth/authorize?client_id={}&response_type=code&redirect_uri={}&username={}&password={}&action=Login",
            self.config.api_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.username),
            urlencoding::encode(&self.config.password),
        );

        let response = self
            .agent
            .get(&url)
            .call()
            .context("Authorization request failed")?;

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .context("Authorization response carried no redirect")?;

        let redirect = Url::parse(location).context("Invalid redirect location")?;
        redirect
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .context("Redirect carried no authorization code")
    }

    /// Leg 2: exchange the code for an access token
    fn exchange_code(&self, code: &str) -> Result<String> {
        let url = format!(
            "{}/oauth/token?client_id={}&client_secret={}&redirect_uri={}&code={}&grant_type=authorization_code",
            self.config.api_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.client_secret),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(code),
        );

        let mut response = self
            .agent
            .post(&url)
            .send_empty()
            .context("Token exchange failed")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;
        Ok(token.access_token)
    }

    /// Leg 3: trade the access token for a session token and REST base
    fn login(&self, access_token: &str) -> Result<Session> {
        let url = format!(
            "{}/rest-services/login?access_token={}&version=*",
            self.config.api_url,
            urlencoding::encode(access_token),
        );

        let mut response = self.agent.get(&url).call().context("Session login failed")?;

        let login: LoginResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse login response")?;

        Ok(Session {
            rest_token: login.rest_token,
            rest_url: login.rest_url,
        })
    }
}

impl Authenticator for CredentialAuthenticator {
    fn acquire(&self) -> Result<Session> {
        let code = self.request_auth_code()?;
        let access_token = self.exchange_code(&code)?;
        self.login(&access_token)
    }
}
