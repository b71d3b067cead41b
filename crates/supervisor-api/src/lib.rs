//! Control-plane API (4.I): an `axum` router over the Supervisor Core.
//!
//! Laid out as `error.rs` (envelope), `handlers.rs` (thin per-endpoint
//! functions), and an auth middleware module, with a `router()` entry
//! point the `supervisor-server` binary crate mounts onto a `hyper`
//! listener.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod rate_limit;
pub mod responses;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::ApiState;

/// Assembles the full `/health`, `/ready`, `/metrics`, `/v1/*` router
/// (§4.I). Authentication middleware is attached unconditionally; when
/// `ApiState::auth` is disabled every request is treated as `Role::Admin`
/// (see `auth::AuthConfig::is_enabled`), so the effect is the same as "no
/// auth" without a second code path.
pub fn router(state: ApiState) -> Router {
    let v1_read = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/config", get(handlers::get_config))
        .route("/config/history", get(handlers::get_config_history))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_viewer));

    let v1_write = Router::new()
        .route("/config", post(handlers::put_config).put(handlers::put_config))
        .route("/config/validate", post(handlers::validate_config))
        .route("/control/reload", post(handlers::reload))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_operator));

    let v1_admin = Router::new()
        .route("/control/restart", post(handlers::restart))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    let v1 = Router::new().merge(v1_read).merge(v1_write).merge(v1_admin);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .nest("/v1", v1)
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
