//! Pending authorizations keyed by the OAuth `state` parameter.
//!
//! The user key never travels through the provider; the callback maps the
//! single-use state back to it.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// An authorization started by `/auth` and not yet completed
#[derive(Clone, Debug)]
pub struct PendingAuthorization {
    pub user_key: String,
    pub created_at: DateTime<Utc>,
}

/// Pending-state registry with expiry
#[derive(Clone)]
pub struct StateManager {
    pending: Arc<DashMap<String, PendingAuthorization>>,
    expiry_duration: Duration,
}

impl StateManager {
    /// Create a new state manager
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long a state stays valid (default config: 600)
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    /// Mint a state token (UUID v4) for `user_key`
    pub fn create_state(&self, user_key: &str) -> String {
        let state = Uuid::new_v4().to_string();
        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                user_key: user_key.to_string(),
                created_at: Utc::now(),
            },
        );
        state
    }

    /// Validate and consume a state token.
    ///
    /// The entry is removed whether or not it is still valid.
    pub fn validate_and_consume(&self, state: &str) -> Option<PendingAuthorization> {
        let (_, entry) = self.pending.remove(state)?;

        if Utc::now() - entry.created_at > self.expiry_duration {
            return None;
        }

        Some(entry)
    }

    /// Drop expired states
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.pending
            .retain(|_, entry| now - entry.created_at <= self.expiry_duration);
    }

    pub fn count(&self) -> usize {
        self.pending.len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!(remaining = manager.count(), "OAuth state cleanup complete");
    }
}
