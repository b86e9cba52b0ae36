// Integration tests for the HTTP surface.
//
// The token endpoint and the calendar API are both served by one wiremock
// server; the router is driven in-process with tower's oneshot.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use calrelay::api::create_router;
use calrelay::config::RelayConfig;
use calrelay::credentials::{CredentialRecord, CredentialStorage, InMemoryStorage};
use calrelay::server::build_app_state;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Test app ─────────────────────────────────────────────────────────────────

struct TestApp {
    server: MockServer,
    storage: Arc<InMemoryStorage>,
    router: Router,
}

async fn create_test_app() -> TestApp {
    let server = MockServer::start().await;

    let mut config = RelayConfig::default();
    config.oauth.client_id = "cid".to_string();
    config.oauth.client_secret = "secret".to_string();
    config.oauth.redirect_uri = "https://relay.example.com/oauth/callback".to_string();
    config.oauth.token_url = format!("{}/token", server.uri());
    config.server.redirect_base = "https://relay.example.com".to_string();
    config.calendar.api_base = server.uri();
    config.http.timeout_seconds = 5;

    let storage = Arc::new(InMemoryStorage::new());
    let state = build_app_state(&config, storage.clone()).unwrap();

    TestApp {
        server,
        storage,
        router: create_router(state),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

async fn send_json(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn seed(app: &TestApp, user_key: &str, access_token: &str, expires_in_secs: i64) {
    app.storage
        .put(&CredentialRecord {
            user_key: user_key.to_string(),
            access_token: access_token.to_string(),
            refresh_token: Some("RT".to_string()),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        })
        .unwrap();
}

async fn expect_no_outbound_calls(app: &TestApp) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.server)
        .await;
}

fn event_body(user: &str) -> Value {
    json!({
        "user": user,
        "title": "Haircut",
        "date": "2026-10-21",
        "start": "17:00",
        "end": "17:45",
        "utcOffset": "-05:00"
    })
}

// ── Health & CORS ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let app = create_test_app().await;
    let (status, json) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_cors_headers_present() {
    let app = create_test_app().await;
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://hook.make.com")
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = send(&app, request).await;
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

// ── Authorization flow ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_auth_requires_user() {
    let app = create_test_app().await;
    let (status, json) = send_json(&app, get("/auth")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing user param");
}

#[tokio::test]
async fn test_auth_redirects_to_consent_page() {
    let app = create_test_app().await;
    let (status, headers, _) = send(&app, get("/auth?user=alice")).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    let location = headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(location.contains("client_id=cid"));
    assert!(location.contains("access_type=offline"));
    assert!(location.contains("prompt=consent"));
    // The user key is bound server-side, not sent to the provider
    assert!(!location.contains("alice"));
}

fn state_from_location(location: &str) -> String {
    let query = location.split_once('?').unwrap().1;
    let params: HashMap<String, String> = serde_urlencoded::from_str(query).unwrap();
    params["state"].clone()
}

#[tokio::test]
async fn test_full_authorization_flow() {
    let app = create_test_app().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=good-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT1",
            "refresh_token": "RT1",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let (_, headers, _) = send(&app, get("/auth?user=alice")).await;
    let state = state_from_location(headers[header::LOCATION].to_str().unwrap());

    let (status, _, body) = send(
        &app,
        get(&format!("/oauth/callback?code=good-code&state={}", state)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Authorization complete"));

    let record = app.storage.get("alice").unwrap().unwrap();
    assert_eq!(record.access_token, "AT1");
    assert_eq!(record.refresh_token.as_deref(), Some("RT1"));

    let (status, json) = send_json(&app, get("/auth/status?user=alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "authenticated": true, "needs_auth": false }));

    // State is single-use
    let (status, _) = send_json(
        &app,
        get(&format!("/oauth/callback?code=good-code&state={}", state)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_rejects_unknown_state() {
    let app = create_test_app().await;
    expect_no_outbound_calls(&app).await;

    let (status, json) = send_json(&app, get("/oauth/callback?code=abc&state=forged")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid or expired OAuth state");
}

#[tokio::test]
async fn test_callback_missing_code() {
    let app = create_test_app().await;
    let (status, json) = send_json(&app, get("/oauth/callback?state=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing code or state");
}

#[tokio::test]
async fn test_callback_provider_error() {
    let app = create_test_app().await;
    let (status, json) = send_json(
        &app,
        get("/oauth/callback?error=access_denied&error_description=User+cancelled"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn test_callback_exchange_failure_is_bad_gateway() {
    let app = create_test_app().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&app.server)
        .await;

    let (_, headers, _) = send(&app, get("/auth?user=alice")).await;
    let state = state_from_location(headers[header::LOCATION].to_str().unwrap());

    let (status, _) = send_json(
        &app,
        get(&format!("/oauth/callback?code=stale&state={}", state)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(app.storage.get("alice").unwrap().is_none());
}

// ── Status ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_requires_user() {
    let app = create_test_app().await;
    let (status, json) = send_json(&app, get("/auth/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "missing_user");
}

#[tokio::test]
async fn test_status_unknown_user() {
    let app = create_test_app().await;
    expect_no_outbound_calls(&app).await;

    let (status, json) = send_json(&app, get("/auth/status?user=alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "authenticated": false,
            "needs_auth": true,
            "auth_url": "https://relay.example.com/auth?user=alice"
        })
    );
}

#[tokio::test]
async fn test_status_refreshes_stale_token() {
    let app = create_test_app().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&app.server)
        .await;
    seed(&app, "bob", "AT1", 10);

    let (_, json) = send_json(&app, get("/auth/status?user=bob")).await;
    assert_eq!(json["authenticated"], true);
    assert_eq!(app.storage.get("bob").unwrap().unwrap().access_token, "AT2");
}

// ── Events ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_event_unknown_user_needs_auth() {
    let app = create_test_app().await;
    expect_no_outbound_calls(&app).await;

    let (status, json) = send_json(&app, post_json("/event", event_body("alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "ok": false,
            "needs_auth": true,
            "error": "not_authenticated",
            "auth_url": "https://relay.example.com/auth?user=alice"
        })
    );
}

#[tokio::test]
async fn test_event_created() {
    let app = create_test_app().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(header_eq("authorization", "Bearer AT1"))
        .and(body_string_contains("2026-10-21T17:00:00-05:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt42" })))
        .expect(1)
        .mount(&app.server)
        .await;
    seed(&app, "carol", "AT1", 3600);

    let (status, json) = send_json(&app, post_json("/event", event_body("carol"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "ok": true, "needs_auth": false, "id": "evt42" }));
}

#[tokio::test]
async fn test_event_provider_401_needs_auth() {
    let app = create_test_app().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.server)
        .await;
    seed(&app, "carol", "AT1", 3600);

    let (status, json) = send_json(&app, post_json("/event", event_body("carol"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["needs_auth"], true);
    assert_eq!(json["auth_url"], "https://relay.example.com/auth?user=carol");
}

#[tokio::test]
async fn test_event_provider_error_is_generic() {
    let app = create_test_app().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(403).set_body_string("rateLimitExceeded"))
        .mount(&app.server)
        .await;
    seed(&app, "carol", "AT1", 3600);

    let (status, json) = send_json(&app, post_json("/event", event_body("carol"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], false);
    assert_eq!(json["needs_auth"], false);
    assert!(json["error"].as_str().unwrap().contains("rateLimitExceeded"));
    assert!(json.get("auth_url").is_none());
}

#[tokio::test]
async fn test_event_missing_date_rejected_without_calls() {
    let app = create_test_app().await;
    expect_no_outbound_calls(&app).await;
    seed(&app, "bob", "AT1", 10);

    let mut body = event_body("bob");
    body.as_object_mut().unwrap().remove("date");

    let (status, json) = send_json(&app, post_json("/event", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["ok"], false);
    assert_eq!(json["needs_auth"], false);
    assert!(json["error"].as_str().unwrap().contains("date"));
}

#[tokio::test]
async fn test_event_missing_user_rejected() {
    let app = create_test_app().await;
    let mut body = event_body("x");
    body.as_object_mut().unwrap().remove("user");

    let (status, json) = send_json(&app, post_json("/event", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "missing_user");
}

#[tokio::test]
async fn test_event_malformed_json_rejected() {
    let app = create_test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/event")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, json) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["ok"], false);
}
