//! Environment-driven configuration.
//!
//! Everything has a default except the store encryption key, which is read
//! separately by [`crate::provision::require_db_key`] and is required with
//! no fallback.

use crate::issuer::IssuerConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Path to the plaintext secret store
pub const DB_ENV: &str = "TOKENVAULT_DB";
/// Per-request timeout for the token endpoint, in seconds
pub const HTTP_TIMEOUT_ENV: &str = "TOKENVAULT_HTTP_TIMEOUT_SECS";
/// Total attempts for transport failures (1 disables retry)
pub const RETRY_MAX_ENV: &str = "TOKENVAULT_RETRY_MAX_ATTEMPTS";
/// First backoff delay in milliseconds; doubles per attempt
pub const RETRY_DELAY_ENV: &str = "TOKENVAULT_RETRY_BASE_DELAY_MS";
/// Override for the provider token endpoint (stub servers, proxies)
pub const TOKEN_URL_ENV: &str = "TOKENVAULT_TOKEN_URL";

const DEFAULT_DB: &str = "secrets.db";

#[derive(Clone, Debug)]
pub struct Config {
    /// Plaintext store location
    pub db_path: PathBuf,
    /// Encrypted blob location (store path + ".enc")
    pub enc_path: PathBuf,
    pub issuer: IssuerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = PathBuf::from(get(DB_ENV).unwrap_or_else(|| DEFAULT_DB.to_string()));

        let mut enc_name = db_path.as_os_str().to_os_string();
        enc_name.push(".enc");
        let enc_path = PathBuf::from(enc_name);

        let mut issuer = IssuerConfig::default();

        if let Some(secs) = get(HTTP_TIMEOUT_ENV) {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("{} must be an integer", HTTP_TIMEOUT_ENV))?;
            issuer.timeout = Duration::from_secs(secs);
        }

        if let Some(attempts) = get(RETRY_MAX_ENV) {
            issuer.max_attempts = attempts
                .parse()
                .with_context(|| format!("{} must be an integer", RETRY_MAX_ENV))?;
        }

        if let Some(millis) = get(RETRY_DELAY_ENV) {
            let millis: u64 = millis
                .parse()
                .with_context(|| format!("{} must be an integer", RETRY_DELAY_ENV))?;
            issuer.base_delay = Duration::from_millis(millis);
        }

        issuer.token_url = get(TOKEN_URL_ENV);

        Ok(Self {
            db_path,
            enc_path,
            issuer,
        })
    }
}
