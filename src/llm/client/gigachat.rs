//! GigaChat access tokens.
//!
//! GigaChat authorizes chat calls with a short-lived bearer token obtained
//! from an OAuth endpoint using the long-lived authorization key. Tokens are
//! cached until shortly before they expire.

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{send_error, LlmError};

/// Refresh tokens this long before their stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Build an authorization key from a client id and secret.
pub fn encode_credentials(client_id: &str, client_secret: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix time in milliseconds.
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

pub(super) struct TokenCache {
    auth_url: String,
    credentials: String,
    scope: String,
    token: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub(super) fn new(auth_url: &str, credentials: &str, scope: &str) -> Self {
        Self {
            auth_url: auth_url.to_string(),
            credentials: credentials.to_string(),
            scope: scope.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Current token, fetching a new one if none is cached or it is about
    /// to expire. Concurrent callers wait for a single exchange.
    pub(super) async fn bearer(&self, http: &Client) -> Result<String, LlmError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.exchange(http).await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    pub(super) async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn exchange(&self, http: &Client) -> Result<AccessToken, LlmError> {
        let rq_uid = Uuid::new_v4();
        debug!("Requesting GigaChat access token (RqUID {})", rq_uid);

        let resp = http
            .post(&self.auth_url)
            .header("Authorization", format!("Basic {}", self.credentials))
            .header("RqUID", rq_uid.to_string())
            .header("Accept", "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(send_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Auth(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let expires_at = DateTime::from_timestamp_millis(token.expires_at)
            .ok_or_else(|| LlmError::Parse(format!("invalid expires_at {}", token.expires_at)))?;

        Ok(AccessToken {
            value: token.access_token,
            expires_at,
        })
    }
}
