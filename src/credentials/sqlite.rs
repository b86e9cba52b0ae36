//! Durable credential storage using SQLite.
//!
//! Records survive restarts. Access and refresh tokens are sealed separately
//! with AES-256-GCM before they touch disk.

use super::{encryption::TokenCipher, CredentialRecord, CredentialStorage};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     user_key TEXT PRIMARY KEY,
///     access_token TEXT NOT NULL,        -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT,                -- Encrypted (optional)
///     refresh_token_nonce TEXT,
///     expires_at TEXT NOT NULL,          -- RFC 3339
///     updated_at TEXT NOT NULL           -- RFC 3339
/// );
/// ```
///
/// The connection sits behind a Mutex; each call holds it for one statement.
/// `get` and `put` block the calling thread for the duration of the SQLite
/// I/O, including when called from async handlers or the refresh task.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

impl SqliteStorage {
    /// Creates or opens a credential database.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher =
            TokenCipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                user_key TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                expires_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential database mutex poisoned"))
    }
}

impl CredentialStorage for SqliteStorage {
    fn get(&self, user_key: &str) -> Result<Option<CredentialRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       expires_at
                FROM credentials
                WHERE user_key = ?1
                "#,
                params![user_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query credentials")?;

        let Some((access_ct, access_nonce, refresh_ct, refresh_nonce, expires_at)) = row else {
            return Ok(None);
        };

        let access_token = self
            .cipher
            .open(&access_ct, &access_nonce)
            .context("Failed to decrypt access token")?;

        let refresh_token = match (refresh_ct, refresh_nonce) {
            (Some(ct), Some(nonce)) => Some(
                self.cipher
                    .open(&ct, &nonce)
                    .context("Failed to decrypt refresh token")?,
            ),
            _ => None,
        };

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .context("Failed to parse expires_at timestamp")?
            .with_timezone(&Utc);

        Ok(Some(CredentialRecord {
            user_key: user_key.to_string(),
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    fn put(&self, record: &CredentialRecord) -> Result<()> {
        let access = self
            .cipher
            .seal(&record.access_token)
            .context("Failed to encrypt access token")?;

        let refresh = record
            .refresh_token
            .as_deref()
            .map(|token| self.cipher.seal(token))
            .transpose()
            .context("Failed to encrypt refresh token")?;
        let (refresh_ct, refresh_nonce) = match refresh {
            Some(sealed) => (Some(sealed.ciphertext), Some(sealed.nonce)),
            None => (None, None),
        };

        let now = Utc::now().to_rfc3339();

        self.lock()?
            .execute(
                r#"
                INSERT INTO credentials (
                    user_key,
                    access_token, access_token_nonce,
                    refresh_token, refresh_token_nonce,
                    expires_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(user_key) DO UPDATE SET
                    access_token = excluded.access_token,
                    access_token_nonce = excluded.access_token_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    record.user_key,
                    access.ciphertext,
                    access.nonce,
                    refresh_ct,
                    refresh_nonce,
                    record.expires_at.to_rfc3339(),
                    now,
                ],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }
}
