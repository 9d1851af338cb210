//! Secret store for OAuth client registrations and user refresh tokens.
//!
//! SQLite-backed, with referential integrity between the two tables enforced
//! at write time. The store holds the long-lived credentials the token issuer
//! exchanges for short-lived access tokens.
//!
//! # Schema
//! ```sql
//! CREATE TABLE clients (
//!     id TEXT PRIMARY KEY,              -- opaque client key, e.g. "ms_graph_prod"
//!     client_id TEXT NOT NULL,          -- provider-assigned application id
//!     client_secret TEXT NOT NULL,      -- sensitive
//!     provider TEXT NOT NULL,           -- "google" | "microsoft"
//!     active INTEGER DEFAULT 1,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! CREATE TABLE users (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     username TEXT NOT NULL,
//!     client_id TEXT NOT NULL REFERENCES clients(id),
//!     refresh_token TEXT NOT NULL,      -- sensitive
//!     revoked INTEGER DEFAULT 0,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! ```
//!
//! # Security
//! - Secrets are plaintext inside the file; at-rest protection for
//!   distribution/backup is the whole-file codec (see [`crate::codec`])
//! - `Debug` for the row types redacts `client_secret` and `refresh_token`
//! - Token rows are revoked, never deleted (audit trail)
//! - SQLite transactions keep every mutation atomic across crashes

use crate::provider::Provider;
use chrono::{DateTime, Utc};
use std::fmt;

mod storage;

pub use storage::SecretStore;

/// An application's registered identity with a provider, shared across users.
#[derive(Clone)]
pub struct ClientRegistration {
    /// Opaque client key, unique within the store (e.g. "ms_graph_prod")
    pub key: String,
    /// Provider-assigned client id
    pub client_id: String,
    /// Provider-assigned client secret. Never logged; only the token issuer
    /// sends it anywhere.
    pub client_secret: String,
    /// Which external service this registration belongs to
    pub provider: Provider,
    /// Deactivated registrations are kept but never returned by lookups
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("key", &self.key)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("provider", &self.provider)
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// A user's long-lived refresh token under one client registration.
#[derive(Clone)]
pub struct UserToken {
    pub id: i64,
    /// Subject identity, e.g. an email address
    pub username: String,
    /// Client key this token was minted under
    pub client_key: String,
    /// Long-lived credential exchanged for access tokens. Never logged.
    pub refresh_token: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for UserToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserToken")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("client_key", &self.client_key)
            .field("refresh_token", &"<redacted>")
            .field("revoked", &self.revoked)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Secret store failures
#[derive(Debug)]
pub enum StoreError {
    /// No matching row (or only revoked/inactive rows)
    NotFound,
    /// Client key already registered under a different provider
    DuplicateKey(String),
    /// User token references a client key with no registration
    UnknownClient(String),
    /// Username has non-revoked tokens under more than one client key;
    /// the caller must scope the lookup by client key
    Ambiguous(String),
    /// Underlying database failure
    Db(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "No matching record in the secret store"),
            StoreError::DuplicateKey(key) => {
                write!(f, "Client key '{}' already registered under another provider", key)
            }
            StoreError::UnknownClient(key) => {
                write!(f, "No client registration for key '{}'", key)
            }
            StoreError::Ambiguous(username) => write!(
                f,
                "User '{}' has tokens under multiple clients; scope the lookup by client key",
                username
            ),
            StoreError::Db(e) => write!(f, "Secret store database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Db(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Db(e)
    }
}
