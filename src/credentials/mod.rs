//! Per-user OAuth credential records and the storage seam behind them.
//!
//! The token manager is the only writer. Storage backends only persist whole
//! records, so an access token and its expiry are always replaced together.
//!
//! # Backends
//!
//! - [`InMemoryStorage`]: default, lost on restart
//! - [`SqliteStorage`]: durable, tokens encrypted at rest with AES-256-GCM
//!
//! # Usage
//!
//! ```no_run
//! use calrelay::credentials::{CredentialRecord, CredentialStorage, InMemoryStorage};
//! use chrono::{Duration, Utc};
//!
//! # fn main() -> anyhow::Result<()> {
//! let storage = InMemoryStorage::new();
//! storage.put(&CredentialRecord {
//!     user_key: "alice".to_string(),
//!     access_token: "ya29.access".to_string(),
//!     refresh_token: Some("1//refresh".to_string()),
//!     expires_at: Utc::now() + Duration::hours(1),
//! })?;
//!
//! if let Some(record) = storage.get("alice")? {
//!     println!("expires at {}", record.expires_at);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod memory;
mod sqlite;

pub use encryption::{SealedToken, TokenCipher};
pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

/// OAuth credentials for one end user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Opaque caller-supplied user identifier
    pub user_key: String,

    /// Bearer token for calendar requests
    pub access_token: String,

    /// Long-lived token used to mint new access tokens.
    /// `None` only when the authorization server never issued one.
    pub refresh_token: Option<String>,

    /// When the access token stops being usable (UTC)
    pub expires_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// True when the access token outlives `now + margin`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at > now + margin
    }
}

/// Keyed storage for credential records.
///
/// Implementations must be safe to share between request handlers.
pub trait CredentialStorage: Send + Sync {
    /// Look up the record for `user_key`.
    fn get(&self, user_key: &str) -> anyhow::Result<Option<CredentialRecord>>;

    /// Insert or replace the record for `record.user_key`.
    fn put(&self, record: &CredentialRecord) -> anyhow::Result<()>;
}
