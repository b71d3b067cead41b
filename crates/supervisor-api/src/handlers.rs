//! HTTP handlers for the control-plane API (§4.I).
//!
//! Thin `axum` functions that pull collaborators out of `State`, delegate
//! to the service layer, and map the result onto a fixed response envelope.
//! `#[instrument]` plus the structured event log already owned by
//! `Supervisor` cover request observability without a separate tracing
//! abstraction.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use supervisor_service::ReloadStrategy;
use tracing::{info, instrument};

use crate::error::{ApiError, ApiResult};
use crate::responses::{
    redact_config, ComponentHealth, ComponentHealthMap, ConfigHistoryEntry, ConfigResultBody, ConfigUpdateBody,
    HealthResponse, OverallHealth, ReadyResponse, ReloadResultBody, SourceBody, SuccessEnvelope, ValidationResultBody,
};
use crate::state::ApiState;

// ---- Unauthenticated infrastructure endpoints ----

/// `GET /health` (§4.I): 200 while the supervisor is up and the collector is
/// healthy or merely degraded; 503 once the collector has exhausted its
/// restart budget and reached `failed` (§8 "Restart-on-exit exhaustion").
#[instrument(skip(state))]
pub async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.supervisor.health().await;
    let collector_state = state.supervisor.status().await.state;
    let collector = if health.state == supervisor_core::HealthState::Healthy {
        ComponentHealth::healthy()
    } else {
        ComponentHealth::unhealthy(health.last_error.unwrap_or_else(|| "collector unhealthy".to_string()))
    };

    let status = if collector.healthy { OverallHealth::Healthy } else { OverallHealth::Unhealthy };
    let code = if collector_state == supervisor_core::CollectorState::Failed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (code, Json(HealthResponse { status, checks: ComponentHealthMap { collector, api: ComponentHealth::healthy() } }))
}

/// `GET /ready` (§4.I): true once the supervisor has finished its startup
/// sequence.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<ApiState>) -> Json<ReadyResponse> {
    Json(ReadyResponse { ready: state.supervisor.is_ready().await })
}

/// `GET /metrics` (§4.I): Prometheus text exposition format.
#[instrument(skip(state))]
pub async fn metrics(State(state): State<ApiState>) -> String {
    let status = state.supervisor.status().await;
    state.metrics.collector_restart_count_total.set(status.restart_count as f64);
    if let Some(rss) = status.rss_bytes {
        state.metrics.collector_memory_bytes.set(rss as f64);
    }
    if let Some(version) = status.config_version {
        state.metrics.config_version.set(version as f64);
    }
    state.metrics.render()
}

// ---- v1: status & config (viewer) ----

/// `GET /v1/status` (§4.I).
#[instrument(skip(state))]
pub async fn get_status(State(state): State<ApiState>) -> Json<supervisor_core::CollectorStatus> {
    Json(state.supervisor.status().await)
}

/// `GET /v1/config` (§4.I): current user config with `license_key` redacted.
#[instrument(skip(state))]
pub async fn get_config(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
    let config = state.supervisor.get_current_config().await?;
    Ok(Json(redact_config(&config)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// `GET /v1/config/history?limit=N` (§4.I).
#[instrument(skip(state))]
pub async fn get_config_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ConfigHistoryEntry>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state.supervisor.get_config_history(limit).await;
    Json(history.iter().map(ConfigHistoryEntry::from).collect())
}

// ---- v1: config mutation (operator) ----

/// `POST|PUT /v1/config` (§4.I).
#[instrument(skip(state, body), fields(dry_run = body.dry_run))]
pub async fn put_config(
    State(state): State<ApiState>,
    Json(body): Json<ConfigUpdateBody>,
) -> ApiResult<(StatusCode, Json<ConfigResultBody>)> {
    let update = supervisor_service::ConfigUpdate {
        raw: body.config,
        format: body.format,
        source: body.source.unwrap_or(SourceBody::Api).into(),
        author: body.author,
        description: body.description,
        dry_run: body.dry_run,
    };

    let result = state.supervisor.apply_config(update).await?;
    let status = if result.valid { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    Ok((
        status,
        Json(ConfigResultBody {
            valid: result.valid,
            version: result.version,
            errors: result.errors,
            config_hash: result.generated.map(|g| g.hash),
        }),
    ))
}

/// `POST /v1/config/validate` (§4.I): dry-run forced regardless of the
/// request body.
#[instrument(skip(state, body))]
pub async fn validate_config(
    State(state): State<ApiState>,
    Json(body): Json<ConfigUpdateBody>,
) -> Json<ValidationResultBody> {
    let result = state.supervisor.validate_config(&body.config, body.format).await;
    Json(ValidationResultBody { valid: result.valid, errors: result.errors })
}

// ---- v1: control (operator / admin) ----

#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequestBody {
    strategy: Option<ReloadStrategy>,
}

/// `POST /v1/control/reload` (§4.I): strategy defaults to blue-green.
#[instrument(skip(state))]
pub async fn reload(
    State(state): State<ApiState>,
    body: Option<Json<ReloadRequestBody>>,
) -> ApiResult<Json<ReloadResultBody>> {
    let strategy = body.and_then(|Json(b)| b.strategy).unwrap_or(ReloadStrategy::BlueGreen);
    let result = state.supervisor.reload(strategy).await;
    state.metrics.reload_total.with_label_values(&[reload_strategy_label(strategy), result_label(result.success)]).inc();
    state.metrics.reload_duration_seconds.with_label_values(&[reload_strategy_label(strategy)]).observe(result.duration_ms as f64 / 1000.0);

    if !result.success {
        return Err(ApiError::Conflict(result.error.clone().unwrap_or_else(|| "reload failed".to_string())));
    }
    Ok(Json(result))
}

/// `POST /v1/control/restart` (§4.I).
#[instrument(skip(state))]
pub async fn restart(State(state): State<ApiState>) -> ApiResult<Json<SuccessEnvelope>> {
    info!("restart requested via control-plane API");
    let result = state.supervisor.restart().await;
    if !result.success {
        return Err(ApiError::Internal(result.error.clone().unwrap_or_else(|| "restart failed".to_string())));
    }
    Ok(Json(SuccessEnvelope::ok()))
}

fn reload_strategy_label(strategy: ReloadStrategy) -> &'static str {
    match strategy {
        ReloadStrategy::BlueGreen => "blue_green",
        ReloadStrategy::Graceful => "graceful",
        ReloadStrategy::InPlace => "in_place",
    }
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}
