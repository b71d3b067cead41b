//! API error envelope (§6 "Error envelope", §7 error kind → code mapping).
//!
//! An internal error enum translated to a fixed JSON shape at the response
//! boundary via `IntoResponse`:
//! `{error:{code,message,details?},request_id,timestamp}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use supervisor_core::{ConfigError, FieldError};
use supervisor_service::SupervisorError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("configuration is invalid")]
    ValidationFailed(Vec<FieldError>),
    #[error("missing or invalid credentials")]
    Unauthorized,
    #[error("caller lacks the required role")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("too many requests")]
    RateLimited,
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) | ApiError::ValidationFailed(_) => "INVALID_REQUEST",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::ValidationFailed(errors) => Some(serde_json::json!(errors)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// §6 "Error envelope": `{error: {code, message, details?}, request_id, timestamp}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    error: ErrorBody,
    request_id: String,
    timestamp: DateTime<Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let details = self.details();
        let body = ErrorEnvelope {
            error: ErrorBody { code, message: self.to_string(), details },
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Invalid(errors) => ApiError::ValidationFailed(errors),
            ConfigError::ParseFailed { .. } => ApiError::InvalidRequest(e.to_string()),
            ConfigError::GenerationFailed(_) => ApiError::Internal(e.to_string()),
            ConfigError::Missing => ApiError::NotFound(e.to_string()),
            ConfigError::NotFound(_) => ApiError::NotFound(e.to_string()),
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::Config(c) => c.into(),
            SupervisorError::Process(_) => ApiError::Internal(e.to_string()),
            SupervisorError::HealthTimeout(_) => ApiError::ServiceUnavailable(e.to_string()),
            SupervisorError::ReloadFailed(_) => ApiError::Internal(e.to_string()),
            SupervisorError::VersionNotFound(_) => ApiError::NotFound(e.to_string()),
            SupervisorError::Io(_) => ApiError::Internal(e.to_string()),
            SupervisorError::SignatureInvalid => ApiError::Forbidden,
            SupervisorError::RemoteConfigExpired => ApiError::Forbidden,
            SupervisorError::RemoteConfig(_) => ApiError::ServiceUnavailable(e.to_string()),
        }
    }
}
