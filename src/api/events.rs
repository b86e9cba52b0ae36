//! Event creation route.
//!
//! `POST /event` always answers with the event outcome shape
//! (`ok`, `needs_auth`, `id` / `auth_url` / `error`). Authorization problems
//! are reported with HTTP 200 and `needs_auth: true`; only malformed requests
//! get a 4xx.

use super::AppState;
use crate::calendar::EventInput;
use crate::relay::{EventOutcome, RelayError};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

/// Request body for POST /event
///
/// Field names follow the automation client; camelCase spellings are accepted too.
#[derive(Deserialize, Debug, Default)]
pub struct EventRequest {
    #[serde(default, alias = "userKey")]
    pub user: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "startTime")]
    pub start: Option<String>,
    #[serde(default, alias = "endTime")]
    pub end: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// String or number
    #[serde(default, rename = "colorId", alias = "color_id")]
    pub color_id: Option<Value>,
    #[serde(default, rename = "utcOffset", alias = "utc_offset")]
    pub utc_offset: Option<String>,
    #[serde(default, rename = "timeZone", alias = "time_zone")]
    pub time_zone: Option<String>,
}

impl EventRequest {
    /// Split into the user key and the event fields
    pub fn into_parts(self) -> (String, EventInput) {
        let color_id = match self.color_id {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let input = EventInput {
            title: self.title,
            date: self.date.unwrap_or_default(),
            start_time: self.start.unwrap_or_default(),
            end_time: self.end.unwrap_or_default(),
            description: self.description,
            color_id,
            utc_offset: self.utc_offset,
            time_zone: self.time_zone,
        };

        (self.user.unwrap_or_default(), input)
    }
}

type EventResponse = (StatusCode, Json<EventOutcome>);

fn bad_request(msg: impl Into<String>) -> EventResponse {
    (StatusCode::BAD_REQUEST, Json(EventOutcome::failed(msg)))
}

/// Create event router
pub fn create_event_router(state: AppState) -> Router {
    Router::new()
        .route("/event", post(create_event))
        .with_state(state)
}

/// POST /event
async fn create_event(
    State(state): State<AppState>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> EventResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected event body");
            return bad_request(rejection.body_text());
        }
    };

    let (user_key, input) = request.into_parts();
    if user_key.is_empty() {
        return bad_request("missing_user");
    }

    match state.relay.create_event(&user_key, &input).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)),
        Err(RelayError::InvalidInput(msg)) => {
            debug!(user_key = %user_key, reason = %msg, "Invalid event request");
            bad_request(msg)
        }
        Err(e) => {
            error!(user_key = %user_key, error = %e, "Create event failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(EventOutcome::failed(e.to_string())))
        }
    }
}
