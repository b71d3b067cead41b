//! Exercises the Control-plane API (4.I) over real HTTP-shaped requests
//! routed through the full `axum` router, backed by a real `Supervisor`
//! wired to the `healthy-collector` fixture -- covering minimal apply and
//! dry-run end to end, plus auth and rate limiting.

mod common;

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use supervisor_api::auth::AuthConfig;
use supervisor_api::rate_limit::RateLimitConfig;
use supervisor_api::state::ApiState;
use supervisor_service::Supervisor;

fn peer() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)), 54321)
}

fn request(method: &str, uri: &str, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request");
    req.extensions_mut().insert(ConnectInfo(peer()));
    req
}

fn get(uri: &str) -> Request<Body> {
    let mut req = Request::builder().method("GET").uri(uri).body(Body::empty()).expect("valid request");
    req.extensions_mut().insert(ConnectInfo(peer()));
    req
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("readable body").to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}

fn state_with_auth(working_dir: std::path::PathBuf, auth: AuthConfig) -> ApiState {
    let supervisor = Supervisor::new(common::supervisor_config(working_dir));
    ApiState::new(supervisor, auth, RateLimitConfig::default())
}

#[tokio::test]
async fn health_and_ready_are_unauthenticated() {
    let working_dir = tempfile::tempdir().unwrap();
    let state = state_with_auth(working_dir.path().to_path_buf(), AuthConfig::default());
    let app = supervisor_api::router(state);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/ready")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["ready"], Value::Bool(false));
}

#[tokio::test]
async fn minimal_apply_produces_version_one_with_expected_pipeline() {
    let working_dir = tempfile::tempdir().unwrap();
    let state = state_with_auth(working_dir.path().to_path_buf(), AuthConfig::default());
    let app = supervisor_api::router(state);

    let body = serde_json::json!({
        "config": common::MINIMAL_YAML,
        "format": "yaml",
        "author": "tester",
        "description": "scenario 1",
    });
    let response = app.clone().oneshot(request("PUT", "/v1/config", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert_eq!(result["valid"], Value::Bool(true));
    assert_eq!(result["version"], Value::from(1));

    let response = app.oneshot(get("/v1/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["config_version"], Value::from(1));
}

#[tokio::test]
async fn dry_run_with_missing_service_name_reports_validation_error_without_mutating_state() {
    let working_dir = tempfile::tempdir().unwrap();
    let state = state_with_auth(working_dir.path().to_path_buf(), AuthConfig::default());
    let app = supervisor_api::router(state);

    let body = serde_json::json!({
        "config": "license_key: \"0123456789012345678901234567890123456789\"\n",
        "format": "yaml",
        "dry_run": true,
    });
    let response = app.clone().oneshot(request("POST", "/v1/config/validate", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert_eq!(result["valid"], Value::Bool(false));
    assert!(!result["errors"].as_array().unwrap().is_empty());

    // `get_current_config` must still report CONFIG_MISSING: nothing was
    // ever successfully applied.
    let response = app.oneshot(get("/v1/config")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reads_require_viewer_and_reject_missing_credentials_when_auth_enabled() {
    let working_dir = tempfile::tempdir().unwrap();
    let auth = AuthConfig { jwt_secret: None, static_api_key: Some("s3cret".to_string()) };
    let state = state_with_auth(working_dir.path().to_path_buf(), auth);
    let app = supervisor_api::router(state);

    let response = app.clone().oneshot(get("/v1/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut authed = get("/v1/status");
    authed.headers_mut().insert("x-api-key", "s3cret".parse().unwrap());
    let response = app.oneshot(authed).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after_once_burst_is_exhausted() {
    let working_dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(common::supervisor_config(working_dir.path().to_path_buf()));
    let state = ApiState::new(
        supervisor,
        AuthConfig::default(),
        RateLimitConfig { burst: 1, refill_per_interval: 1, interval: std::time::Duration::from_secs(3600) },
    );
    let app = supervisor_api::router(state);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::RETRY_AFTER).is_some());
}
