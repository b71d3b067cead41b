//! Error types for the supervision layer (Config Engine, Collector Process,
//! Health Checker, Restart Policy, Reload Engine, Supervisor Core).
//!
//! These sit one level above `supervisor_core::ConfigError`: most variants
//! wrap a `ConfigError` unchanged, the rest cover the I/O and process
//! concerns the core crate deliberately knows nothing about.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] supervisor_core::ConfigError),

    #[error("collector process error: {0}")]
    Process(String),

    #[error("health check timed out after {0:?}")]
    HealthTimeout(std::time::Duration),

    #[error("reload failed: {0}")]
    ReloadFailed(String),

    #[error("requested config version {0} not found in history")]
    VersionNotFound(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote config signature verification failed")]
    SignatureInvalid,

    #[error("remote config has expired (valid_until in the past)")]
    RemoteConfigExpired,

    #[error("remote config client error: {0}")]
    RemoteConfig(String),
}

impl SupervisorError {
    /// Stable error code surfaced in the API error envelope (§6/§7).
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::Config(e) => e.code(),
            SupervisorError::Process(_) => "INTERNAL_ERROR",
            SupervisorError::HealthTimeout(_) => "SERVICE_UNAVAILABLE",
            SupervisorError::ReloadFailed(_) => "CONFLICT",
            SupervisorError::VersionNotFound(_) => "NOT_FOUND",
            SupervisorError::Io(_) => "INTERNAL_ERROR",
            SupervisorError::SignatureInvalid => "FORBIDDEN",
            SupervisorError::RemoteConfigExpired => "FORBIDDEN",
            SupervisorError::RemoteConfig(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
