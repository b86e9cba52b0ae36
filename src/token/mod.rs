//! Token lifecycle manager.
//!
//! Owns every [`CredentialRecord`], decides when a cached access token is
//! still usable, and refreshes it when it is not. Refreshes are single-flight
//! per user key: concurrent callers that find the same stale record share one
//! refresh call and all receive its result.
//!
//! ```text
//! get_usable_access_token(key)
//!   ├─ no record ─────────────────────────────► NotAuthorized
//!   ├─ expires_at > now + margin ─────────────► cached token
//!   └─ stale ─► join or start in-flight refresh
//!                 ├─ ok ──► store (access_token, expires_at) ──► new token
//!                 └─ err ─► record untouched ──────────────────► RefreshFailed
//! ```

use crate::config::TokenConfig;
use crate::credentials::{CredentialRecord, CredentialStorage};
use crate::oauth::{OAuthClient, OAuthError};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};


/// Why a refresh could not produce a new access token
#[derive(Debug, Error)]
pub enum RefreshCause {
    /// The authorization server never issued a refresh token for this user
    #[error("no refresh token on file")]
    MissingRefreshToken,

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// The refresh task ended without producing a result
    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

/// Token manager errors.
///
/// Cloneable so one refresh outcome can be handed to every waiting caller.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// Rejected before any lookup or network call
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No credential on file for the user key
    #[error("user has not authorized calendar access")]
    NotAuthorized,

    /// Refresh token rejected or unreachable token endpoint.
    /// Treated as "needs re-authorization"; the stale record is kept.
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] Arc<RefreshCause>),

    /// Initial authorization-code exchange failed
    #[error("authorization code exchange failed: {0}")]
    TokenExchangeFailed(#[source] Arc<OAuthError>),

    /// Credential backend failure
    #[error("credential storage error: {0}")]
    Storage(Arc<anyhow::Error>),
}

impl TokenError {
    /// True for failures only a fresh authorization can fix
    pub fn needs_authorization(&self) -> bool {
        matches!(self, TokenError::NotAuthorized | TokenError::RefreshFailed(_))
    }

    fn storage(err: anyhow::Error) -> Self {
        TokenError::Storage(Arc::new(err))
    }
}

type RefreshFlight = Shared<BoxFuture<'static, Result<String, TokenError>>>;

/// Per-user credential store front-end with single-flight refresh
pub struct TokenManager {
    storage: Arc<dyn CredentialStorage>,
    oauth: OAuthClient,
    refresh_margin: Duration,
    default_expires_in: i64,
    in_flight: Arc<DashMap<String, RefreshFlight>>,
}

impl TokenManager {
    pub fn new(storage: Arc<dyn CredentialStorage>, oauth: OAuthClient, config: &TokenConfig) -> Self {
        Self {
            storage,
            oauth,
            refresh_margin: Duration::seconds(config.refresh_margin_seconds),
            default_expires_in: config.default_expires_in_seconds,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace the credentials for `user_key`.
    ///
    /// `expires_in_seconds` falls back to the configured default (3600). When
    /// `refresh_token` is `None`, a refresh token already on file is kept.
    pub fn record_authorization(
        &self,
        user_key: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_seconds: Option<i64>,
    ) -> Result<(), TokenError> {
        if user_key.is_empty() {
            return Err(TokenError::InvalidInput("user key is empty".to_string()));
        }
        if access_token.is_empty() {
            return Err(TokenError::InvalidInput("access token is empty".to_string()));
        }

        let refresh_token = match refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => Some(token.to_string()),
            None => self
                .storage
                .get(user_key)
                .map_err(TokenError::storage)?
                .and_then(|existing| existing.refresh_token),
        };

        if refresh_token.is_none() {
            warn!(user_key = %user_key, "Authorization recorded without a refresh token");
        }

        let expires_in = expires_in_seconds.unwrap_or(self.default_expires_in);
        let expires_at = expiry_after(expires_in).ok_or_else(|| {
            TokenError::InvalidInput(format!("expires_in {} out of range", expires_in))
        })?;
        let record = CredentialRecord {
            user_key: user_key.to_string(),
            access_token: access_token.to_string(),
            refresh_token,
            expires_at,
        };

        self.storage.put(&record).map_err(TokenError::storage)?;

        debug!(
            user_key = %user_key,
            expires_in,
            has_refresh_token = record.refresh_token.is_some(),
            "Authorization recorded"
        );
        Ok(())
    }

    /// Exchange an authorization code and record the resulting tokens for `user_key`.
    ///
    /// Not retried: a failure is terminal for the current authorization attempt.
    pub async fn exchange_authorization_code(&self, code: &str, user_key: &str) -> Result<(), TokenError> {
        if code.is_empty() {
            return Err(TokenError::InvalidInput("authorization code is empty".to_string()));
        }
        if user_key.is_empty() {
            return Err(TokenError::InvalidInput("user key is empty".to_string()));
        }

        let response = self.oauth.exchange_code(code).await.map_err(|e| {
            warn!(user_key = %user_key, error = %e, "Authorization code exchange failed");
            TokenError::TokenExchangeFailed(Arc::new(e))
        })?;

        self.record_authorization(
            user_key,
            &response.access_token,
            response.refresh_token.as_deref(),
            response.expires_in,
        )?;

        info!(user_key = %user_key, "User authorized");
        Ok(())
    }

    /// Return an access token that stays valid past the refresh margin.
    ///
    /// Issues a network call only when the cached token is stale.
    pub async fn get_usable_access_token(&self, user_key: &str) -> Result<String, TokenError> {
        let record = self
            .storage
            .get(user_key)
            .map_err(TokenError::storage)?
            .ok_or(TokenError::NotAuthorized)?;

        if record.is_fresh_at(Utc::now(), self.refresh_margin) {
            return Ok(record.access_token);
        }

        debug!(user_key = %user_key, expires_at = %record.expires_at, "Access token stale");
        self.join_refresh(user_key).await
    }

    /// Whether a usable token can be produced for `user_key` right now.
    ///
    /// Refreshes if needed, so a revoked refresh token reports `false`.
    pub async fn authorization_status(&self, user_key: &str) -> Result<bool, TokenError> {
        match self.get_usable_access_token(user_key).await {
            Ok(_) => Ok(true),
            Err(e) if e.needs_authorization() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Number of refreshes currently running
    pub fn refreshes_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn join_refresh(&self, user_key: &str) -> RefreshFlight {
        self.in_flight
            .entry(user_key.to_string())
            .or_insert_with(|| self.spawn_refresh(user_key))
            .value()
            .clone()
    }

    // The task removes its own map entry once the record is updated (or left
    // alone on failure); callers arriving later see the stored result.
    fn spawn_refresh(&self, user_key: &str) -> RefreshFlight {
        let storage = self.storage.clone();
        let oauth = self.oauth.clone();
        let in_flight = self.in_flight.clone();
        let margin = self.refresh_margin;
        let default_expires_in = self.default_expires_in;
        let key = user_key.to_string();

        let handle = tokio::spawn(async move {
            let result = refresh_record(storage.as_ref(), &oauth, &key, margin, default_expires_in).await;
            in_flight.remove(&key);
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(TokenError::RefreshFailed(Arc::new(RefreshCause::Aborted(e.to_string()))))
            })
        }
        .boxed()
        .shared()
    }
}

async fn refresh_record(
    storage: &dyn CredentialStorage,
    oauth: &OAuthClient,
    user_key: &str,
    margin: Duration,
    default_expires_in: i64,
) -> Result<String, TokenError> {
    // Re-read: a refresh that finished just before this one started already did the work
    let record = storage
        .get(user_key)
        .map_err(TokenError::storage)?
        .ok_or(TokenError::NotAuthorized)?;

    if record.is_fresh_at(Utc::now(), margin) {
        return Ok(record.access_token);
    }

    let Some(refresh_token) = record.refresh_token.as_deref() else {
        warn!(user_key = %user_key, "Access token stale and no refresh token on file");
        return Err(TokenError::RefreshFailed(Arc::new(RefreshCause::MissingRefreshToken)));
    };

    let response = oauth.refresh(refresh_token).await.map_err(|e| {
        warn!(user_key = %user_key, error = %e, "Token refresh failed");
        TokenError::RefreshFailed(Arc::new(RefreshCause::OAuth(e)))
    })?;

    if response
        .refresh_token
        .as_deref()
        .is_some_and(|rotated| rotated != refresh_token)
    {
        debug!(user_key = %user_key, "Ignoring refresh token returned by refresh grant");
    }

    let expires_in = response.expires_in.unwrap_or(default_expires_in);
    let Some(expires_at) = expiry_after(expires_in) else {
        let cause = OAuthError::Decode(format!("expires_in {} out of range", expires_in));
        return Err(TokenError::RefreshFailed(Arc::new(RefreshCause::OAuth(cause))));
    };
    let updated = CredentialRecord {
        access_token: response.access_token,
        expires_at,
        ..record
    };

    storage.put(&updated).map_err(TokenError::storage)?;

    info!(user_key = %user_key, expires_at = %updated.expires_at, "Access token refreshed");
    Ok(updated.access_token)
}

// `None` when the lifetime cannot be represented as a timestamp
fn expiry_after(expires_in: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(expires_in).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}
