// HTTP surface: authorization flow, status check, event creation

pub mod auth;
pub mod events;

use crate::oauth::{ConsentEndpoint, StateManager};
use crate::relay::Relay;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use auth::create_auth_router;
pub use events::create_event_router;

/// Shared application state for all routes
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub state_manager: StateManager,
    pub consent: ConsentEndpoint,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for the authorization routes
pub(crate) enum AppError {
    BadRequest(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Full application router with permissive CORS
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(create_auth_router(state.clone()))
        .merge(create_event_router(state))
        .layer(CorsLayer::permissive())
}
