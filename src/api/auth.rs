//! Authorization routes.
//!
//! - `GET /auth?user=<key>` starts the flow (redirect to consent page)
//! - `GET /oauth/callback` finishes it (code exchange)
//! - `GET /auth/status?user=<key>` reports whether the user can be served

use super::{AppError, AppState};
use crate::relay::RelayError;
use crate::token::TokenError;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

/// `?user=` query used by `/auth` and `/auth/status`
#[derive(Deserialize)]
pub struct UserQuery {
    #[serde(default, alias = "userKey")]
    user: Option<String>,
}

impl UserQuery {
    fn user_key(self) -> Option<String> {
        self.user.filter(|u| !u.is_empty())
    }
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

const AUTHORIZED_MESSAGE: &str = "Authorization complete. You can return to your conversation.";

/// Create authorization router
pub fn create_auth_router(state: AppState) -> Router {
    Router::new()
        .route("/auth", get(auth_start))
        .route("/auth/status", get(auth_status))
        .route("/oauth/callback", get(oauth_callback))
        .with_state(state)
}

/// GET /auth?user=<key>
///
/// Mints a single-use state bound to the user key and redirects to the
/// provider's consent page.
async fn auth_start(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Redirect, AppError> {
    let user_key = query
        .user_key()
        .ok_or_else(|| AppError::BadRequest("Missing user param".to_string()))?;

    let csrf_state = state.state_manager.create_state(&user_key);
    let url = state.consent.build_url(&csrf_state);

    info!(user_key = %user_key, "Redirecting to OAuth provider");
    Ok(Redirect::temporary(&url))
}

/// GET /oauth/callback
///
/// Exchanges the authorization code and records the tokens for the user key
/// bound to `state`.
async fn oauth_callback(
    State(state): State<AppState>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let (code, csrf_state) = match (callback.code, callback.state) {
        (Some(code), Some(csrf_state)) if !code.is_empty() && !csrf_state.is_empty() => {
            (code, csrf_state)
        }
        _ => return Err(AppError::BadRequest("Missing code or state".to_string())),
    };

    let pending = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!("Invalid or expired OAuth state");
            AppError::BadRequest("Invalid or expired OAuth state".to_string())
        })?;

    debug!(user_key = %pending.user_key, "OAuth state validated");

    match state.relay.complete_authorization(&code, &pending.user_key).await {
        Ok(()) => Ok(AUTHORIZED_MESSAGE.into_response()),
        Err(RelayError::Token(TokenError::TokenExchangeFailed(e))) => {
            error!(user_key = %pending.user_key, error = %e, "Token exchange failed");
            Err(AppError::BadGateway(format!(
                "Failed to exchange authorization code: {}",
                e
            )))
        }
        Err(RelayError::InvalidInput(msg))
        | Err(RelayError::Token(TokenError::InvalidInput(msg))) => Err(AppError::BadRequest(msg)),
        Err(e) => {
            error!(user_key = %pending.user_key, error = %e, "Failed to record authorization");
            Err(AppError::ServerError(e.to_string()))
        }
    }
}

/// GET /auth/status?user=<key>
///
/// Attempts a refresh when needed, so the answer reflects whether an event
/// could be created right now.
async fn auth_status(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Response, AppError> {
    let user_key = query
        .user_key()
        .ok_or_else(|| AppError::BadRequest("missing_user".to_string()))?;

    match state.relay.status(&user_key).await {
        Ok(outcome) => Ok(Json(outcome).into_response()),
        Err(RelayError::InvalidInput(msg)) => Err(AppError::BadRequest(msg)),
        Err(e) => {
            error!(user_key = %user_key, error = %e, "Status check failed");
            Err(AppError::ServerError(e.to_string()))
        }
    }
}
