//! Caller-facing contract: status checks and event creation.
//!
//! `NotAuthorized`, `RefreshFailed` and a provider 401 all collapse into one
//! "needs authorization" outcome carrying a fresh `auth_url`; callers never
//! have to tell them apart. Every other failure becomes a generic outcome with
//! a message.

use crate::calendar::{CalendarClient, CalendarError, EventInput};
use crate::token::{TokenError, TokenManager};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};


/// Error string reported alongside `needs_auth: true`
pub const NOT_AUTHENTICATED: &str = "not_authenticated";

/// Failures the relay reports instead of an outcome
#[derive(Debug, Error)]
pub enum RelayError {
    /// Rejected before any credential lookup or network call
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Result of `GET /auth/status`
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub authenticated: bool,
    pub needs_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

/// Result of `POST /event`
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EventOutcome {
    pub ok: bool,
    pub needs_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventOutcome {
    pub fn created(id: String) -> Self {
        Self {
            ok: true,
            needs_auth: false,
            id: Some(id),
            auth_url: None,
            error: None,
        }
    }

    pub fn needs_auth(auth_url: String) -> Self {
        Self {
            ok: false,
            needs_auth: true,
            id: None,
            auth_url: Some(auth_url),
            error: Some(NOT_AUTHENTICATED.to_string()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            needs_auth: false,
            id: None,
            auth_url: None,
            error: Some(error.into()),
        }
    }
}

/// Token manager + calendar submitter behind one caller contract
pub struct Relay {
    tokens: Arc<TokenManager>,
    calendar: CalendarClient,
    redirect_base: String,
}

impl Relay {
    pub fn new(tokens: Arc<TokenManager>, calendar: CalendarClient, redirect_base: &str) -> Self {
        Self {
            tokens,
            calendar,
            redirect_base: redirect_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Where to send a user to (re)authorize: `{redirect_base}/auth?user=<key>`
    pub fn auth_url(&self, user_key: &str) -> String {
        format!(
            "{}/auth?user={}",
            self.redirect_base,
            urlencoding::encode(user_key)
        )
    }

    /// Complete an authorization started by `/auth`.
    pub async fn complete_authorization(&self, code: &str, user_key: &str) -> Result<(), RelayError> {
        self.tokens
            .exchange_authorization_code(code, user_key)
            .await
            .map_err(RelayError::from)
    }

    /// Report whether `user_key` can be served right now.
    ///
    /// Attempts a refresh when the cached token is stale, so a revoked grant
    /// shows up here rather than on the next event.
    pub async fn status(&self, user_key: &str) -> Result<StatusOutcome, RelayError> {
        if user_key.is_empty() {
            return Err(RelayError::InvalidInput("missing_user".to_string()));
        }

        let authenticated = self.tokens.authorization_status(user_key).await?;
        Ok(StatusOutcome {
            authenticated,
            needs_auth: !authenticated,
            auth_url: (!authenticated).then(|| self.auth_url(user_key)),
        })
    }

    /// Create an event for `user_key`.
    ///
    /// Input problems are returned as `Err` before anything else happens;
    /// everything after that is reported through the outcome.
    pub async fn create_event(&self, user_key: &str, input: &EventInput) -> Result<EventOutcome, RelayError> {
        if user_key.is_empty() {
            return Err(RelayError::InvalidInput("missing_user".to_string()));
        }
        input.validate().map_err(|e| RelayError::InvalidInput(e.to_string()))?;

        let access_token = match self.tokens.get_usable_access_token(user_key).await {
            Ok(token) => token,
            Err(e) if e.needs_authorization() => {
                info!(user_key = %user_key, reason = %e, "User needs authorization");
                return Ok(EventOutcome::needs_auth(self.auth_url(user_key)));
            }
            Err(e) => {
                error!(user_key = %user_key, error = %e, "Failed to obtain access token");
                return Ok(EventOutcome::failed(e.to_string()));
            }
        };

        match self.calendar.create_event(&access_token, input).await {
            Ok(id) => Ok(EventOutcome::created(id)),
            Err(CalendarError::Unauthorized) => {
                warn!(user_key = %user_key, "Provider rejected a fresh token, re-authorization required");
                Ok(EventOutcome::needs_auth(self.auth_url(user_key)))
            }
            Err(CalendarError::InvalidInput(msg)) => Err(RelayError::InvalidInput(msg)),
            Err(e) => {
                error!(user_key = %user_key, error = %e, "Create event failed");
                Ok(EventOutcome::failed(e.to_string()))
            }
        }
    }
}
