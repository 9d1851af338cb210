//! SQLite persistence for client registrations and user tokens.

use super::{ClientRegistration, StoreError, UserToken};
use crate::provider::Provider;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

/// Secret store backed by a single SQLite file.
///
/// # Thread safety
/// The connection is wrapped in a `Mutex`; SQLite's own transactional
/// guarantees cover separate process invocations against the same file.
///
/// # Durability
/// Every mutating operation runs as one transaction and is committed before
/// the method returns `Ok`. A crash mid-operation leaves no partial rows.
pub struct SecretStore {
    conn: Mutex<Connection>,
}

impl SecretStore {
    /// Creates or opens a secret store at `db_path`, bootstrapping the
    /// schema if the file is new. Use `":memory:"` for tests.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;

        // Declared REFERENCES clauses are inert without this pragma
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                client_secret TEXT NOT NULL,
                provider TEXT NOT NULL,
                active INTEGER DEFAULT 1,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                client_id TEXT NOT NULL REFERENCES clients(id),
                refresh_token TEXT NOT NULL,
                revoked INTEGER DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_users_username ON users(username, revoked)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Registers a client, or rotates an existing registration in place.
    ///
    /// Conflict policy: re-registering the same `key` under the same
    /// provider replaces `client_id`/`client_secret` and reactivates the row
    /// (safe to re-run with rotated credentials). Re-using a `key` for a
    /// *different* provider fails with [`StoreError::DuplicateKey`].
    pub fn upsert_client(
        &self,
        key: &str,
        client_id: &str,
        client_secret: &str,
        provider: Provider,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<Provider> = tx
            .query_row(
                "SELECT provider FROM clients WHERE id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(registered) = existing {
            if registered != provider {
                return Err(StoreError::DuplicateKey(key.to_string()));
            }
        }

        tx.execute(
            r#"
            INSERT INTO clients (id, client_id, client_secret, provider, active, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5)
            ON CONFLICT(id) DO UPDATE SET
                client_id = excluded.client_id,
                client_secret = excluded.client_secret,
                active = 1
            "#,
            params![key, client_id, client_secret, provider, Utc::now()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Marks a registration inactive. The row is kept; lookups skip it.
    pub fn deactivate_client(&self, key: &str) -> Result<(), StoreError> {
        let changed = self.conn.lock().unwrap().execute(
            "UPDATE clients SET active = 0 WHERE id = ?1 AND active = 1",
            params![key],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Fetches the active registration with the given client key.
    pub fn get_client(&self, key: &str) -> Result<ClientRegistration, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT id, client_id, client_secret, provider, active, created_at
            FROM clients
            WHERE id = ?1 AND active = 1
            "#,
            params![key],
            row_to_client,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    /// Fetches the active registration for a provider.
    ///
    /// When several are active, the most recently created wins (ties broken
    /// by insertion order) so the choice is deterministic.
    pub fn get_client_by_provider(
        &self,
        provider: Provider,
    ) -> Result<ClientRegistration, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT id, client_id, client_secret, provider, active, created_at
            FROM clients
            WHERE provider = ?1 AND active = 1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            params![provider],
            row_to_client,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    /// Lists all client registrations, including deactivated ones.
    pub fn list_clients(&self) -> Result<Vec<ClientRegistration>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, client_id, client_secret, provider, active, created_at
            FROM clients
            ORDER BY created_at, rowid
            "#,
        )?;

        let clients = stmt
            .query_map([], row_to_client)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    /// Stores a refresh token for `(username, client_key)`.
    ///
    /// Fails with [`StoreError::UnknownClient`] when `client_key` has no
    /// registration; the check runs inside the same transaction as the
    /// insert, so the store is left untouched on failure.
    ///
    /// Re-running for the same pair revokes the previous row and inserts a
    /// new one, keeping history while leaving exactly one authoritative
    /// non-revoked token.
    pub fn upsert_user_token(
        &self,
        username: &str,
        client_key: &str,
        refresh_token: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let known: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM clients WHERE id = ?1",
                params![client_key],
                |row| row.get(0),
            )
            .optional()?;

        if known.is_none() {
            return Err(StoreError::UnknownClient(client_key.to_string()));
        }

        tx.execute(
            "UPDATE users SET revoked = 1 WHERE username = ?1 AND client_id = ?2 AND revoked = 0",
            params![username, client_key],
        )?;

        tx.execute(
            r#"
            INSERT INTO users (username, client_id, refresh_token, revoked, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            "#,
            params![username, client_key, refresh_token, Utc::now()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Resolves the single authoritative non-revoked token for a user.
    ///
    /// Fails with [`StoreError::NotFound`] when none exists, and with
    /// [`StoreError::Ambiguous`] when the user holds tokens under more than
    /// one client key; use [`Self::get_active_token_for_client`] then.
    pub fn get_active_token(&self, username: &str) -> Result<UserToken, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, username, client_id, refresh_token, revoked, created_at
            FROM users
            WHERE username = ?1 AND revoked = 0
            ORDER BY created_at DESC, id DESC
            "#,
        )?;

        let tokens = stmt
            .query_map(params![username], row_to_token)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tokens = tokens.into_iter();
        match tokens.next() {
            None => Err(StoreError::NotFound),
            Some(newest) => {
                if tokens.any(|t| t.client_key != newest.client_key) {
                    Err(StoreError::Ambiguous(username.to_string()))
                } else {
                    Ok(newest)
                }
            }
        }
    }

    /// Resolves the non-revoked token for a user under one specific client.
    /// The most recent row wins, so the result is deterministic.
    pub fn get_active_token_for_client(
        &self,
        username: &str,
        client_key: &str,
    ) -> Result<UserToken, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT id, username, client_id, refresh_token, revoked, created_at
            FROM users
            WHERE username = ?1 AND client_id = ?2 AND revoked = 0
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            params![username, client_key],
            row_to_token,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    /// Revokes every non-revoked token for a user. Rows are kept for audit.
    ///
    /// Fails with [`StoreError::NotFound`] when there was nothing to revoke.
    pub fn revoke_token(&self, username: &str) -> Result<(), StoreError> {
        let changed = self.conn.lock().unwrap().execute(
            "UPDATE users SET revoked = 1 WHERE username = ?1 AND revoked = 0",
            params![username],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Lists every token row for a user, revoked ones included (audit view).
    pub fn list_tokens(&self, username: &str) -> Result<Vec<UserToken>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, username, client_id, refresh_token, revoked, created_at
            FROM users
            WHERE username = ?1
            ORDER BY created_at, id
            "#,
        )?;

        let tokens = stmt
            .query_map(params![username], row_to_token)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }
}

fn row_to_client(row: &Row<'_>) -> rusqlite::Result<ClientRegistration> {
    Ok(ClientRegistration {
        key: row.get(0)?,
        client_id: row.get(1)?,
        client_secret: row.get(2)?,
        provider: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<UserToken> {
    Ok(UserToken {
        id: row.get(0)?,
        username: row.get(1)?,
        client_key: row.get(2)?,
        refresh_token: row.get(3)?,
        revoked: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}
