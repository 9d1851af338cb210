//! Refresh-token to access-token exchange.
//!
//! A [`TokenIssuer`] resolves a user's stored refresh token and client
//! registration, POSTs the standard `grant_type=refresh_token` form to the
//! provider's token endpoint, and hands back the short-lived bearer token.
//!
//! The issuer is an explicit value constructed per process and called on
//! demand; it never caches a minted token. Callers that want reuse cache
//! externally within the provider-supplied `expires_in` window.
//!
//! # Failure semantics
//! - Transport failures are retried with exponential backoff, bounded by
//!   [`IssuerConfig::max_attempts`].
//! - A non-2xx provider response is [`IssuerError::RefreshFailed`] and is
//!   never retried: it almost always means the refresh token was revoked
//!   upstream and a human has to re-provision, so looping would only mask
//!   the problem from alerting.

use crate::store::{SecretStore, StoreError, UserToken};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Issuer tuning. Defaults are conservative; tests override `token_url` to
/// point at a stub endpoint.
#[derive(Clone, Debug)]
pub struct IssuerConfig {
    /// Per-request timeout on the token endpoint call
    pub timeout: Duration,
    /// Total attempts for transport-level failures (1 = no retry)
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt
    pub base_delay: Duration,
    /// When set, used instead of the provider's token endpoint
    pub token_url: Option<String>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            token_url: None,
        }
    }
}

/// Ephemeral bearer credential. Never persisted, never cached here.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer token value, for `Authorization: Bearer <token>` headers
    pub token: String,
    /// Provider-supplied validity window in seconds, when given
    pub expires_in: Option<i64>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token issuance failures, distinguishable so calling automation can alert
/// instead of blindly retrying.
#[derive(Debug)]
pub enum IssuerError {
    /// Secret store could not resolve a usable token + client pair
    NoCredentials(StoreError),
    /// Transport-level failure reaching the token endpoint (after retries)
    NetworkError(reqwest::Error),
    /// Provider rejected the exchange. Not retryable; the refresh token
    /// likely needs re-provisioning.
    RefreshFailed { status: u16, body: String },
    /// Provider answered 2xx but the body was not a token response
    InvalidResponse(String),
}

impl fmt::Display for IssuerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuerError::NoCredentials(e) => {
                write!(f, "No usable credentials in the secret store: {}", e)
            }
            IssuerError::NetworkError(e) => {
                write!(f, "Failed to reach the token endpoint: {}", e)
            }
            IssuerError::RefreshFailed { status, body } => {
                write!(f, "Token refresh rejected with status {}: {}", status, body)
            }
            IssuerError::InvalidResponse(msg) => {
                write!(f, "Malformed token endpoint response: {}", msg)
            }
        }
    }
}

impl std::error::Error for IssuerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IssuerError::NoCredentials(e) => Some(e),
            IssuerError::NetworkError(e) => Some(e),
            _ => None,
        }
    }
}

/// Standard OAuth 2.0 token response
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Mints access tokens from stored refresh tokens.
pub struct TokenIssuer {
    store: Arc<SecretStore>,
    http_client: reqwest::Client,
    config: IssuerConfig,
}

impl TokenIssuer {
    pub fn new(store: Arc<SecretStore>, config: IssuerConfig) -> Result<Self, IssuerError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IssuerError::NetworkError)?;

        Ok(Self {
            store,
            http_client,
            config,
        })
    }

    /// Mints an access token for `username`.
    ///
    /// Resolution fails with [`IssuerError::NoCredentials`] when the user has
    /// no non-revoked token, or holds tokens under more than one client (use
    /// [`Self::get_access_token_for_client`] to disambiguate).
    pub async fn get_access_token(&self, username: &str) -> Result<AccessToken, IssuerError> {
        let token = self
            .store
            .get_active_token(username)
            .map_err(IssuerError::NoCredentials)?;
        self.exchange(&token).await
    }

    /// Mints an access token for `username` scoped to one client key.
    pub async fn get_access_token_for_client(
        &self,
        username: &str,
        client_key: &str,
    ) -> Result<AccessToken, IssuerError> {
        let token = self
            .store
            .get_active_token_for_client(username, client_key)
            .map_err(IssuerError::NoCredentials)?;
        self.exchange(&token).await
    }

    /// Performs the refresh-token grant against the provider token endpoint.
    async fn exchange(&self, user_token: &UserToken) -> Result<AccessToken, IssuerError> {
        let client = self
            .store
            .get_client(&user_token.client_key)
            .map_err(IssuerError::NoCredentials)?;

        let token_url = self
            .config
            .token_url
            .clone()
            .unwrap_or_else(|| client.provider.token_url().to_string());

        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("client_id", &client.client_id);
        form.insert("client_secret", &client.client_secret);
        form.insert("refresh_token", &user_token.refresh_token);
        form.insert("grant_type", "refresh_token");

        let response = self.post_with_retry(&token_url, &form).await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(IssuerError::NetworkError)?;

        if !status.is_success() {
            return Err(IssuerError::RefreshFailed {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse =
            serde_json::from_str(&body).map_err(|e| IssuerError::InvalidResponse(e.to_string()))?;

        info!(
            username = %user_token.username,
            client = %user_token.client_key,
            provider = %client.provider,
            expires_in = ?token_response.expires_in,
            "Issued access token"
        );

        Ok(AccessToken {
            token: token_response.access_token,
            expires_in: token_response.expires_in,
        })
    }

    /// POSTs the exchange form, retrying transport failures only.
    async fn post_with_retry(
        &self,
        token_url: &str,
        form: &HashMap<&str, &str>,
    ) -> Result<reqwest::Response, IssuerError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.base_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .http_client
                .post(token_url)
                .header("Accept", "application/json")
                .form(form)
                .send()
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt >= max_attempts {
                        return Err(IssuerError::NetworkError(e));
                    }
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Token endpoint unreachable, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}
