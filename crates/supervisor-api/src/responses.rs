//! Response envelopes and request bodies for the `/v1/*` surface (§4.I,
//! §6 "HTTP API").
//!
//! A plain `{data...}` response shape, with a dedicated
//! `HealthResponse`/`ComponentHealth` pair for the health endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supervisor_core::{Config, ConfigFormat, ConfigVersion, FieldError};
use supervisor_service::{ConfigSource, ReloadResult};

/// `GET /health` response (§4.I).
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: OverallHealth,
    pub checks: ComponentHealthMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealthMap {
    pub collector: ComponentHealth,
    pub api: ComponentHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self { healthy: true, detail: None }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self { healthy: false, detail: Some(detail.into()) }
    }
}

/// `GET /ready` response (§4.I).
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// Request body shared by `POST|PUT /v1/config` and
/// `POST /v1/config/validate` (§4.I "ConfigUpdate body").
#[derive(Debug, Deserialize)]
pub struct ConfigUpdateBody {
    pub config: String,
    #[serde(default = "default_format")]
    pub format: ConfigFormat,
    #[serde(default)]
    pub source: Option<SourceBody>,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_format() -> ConfigFormat {
    ConfigFormat::Yaml
}

fn default_author() -> String {
    "api".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBody {
    File,
    Api,
    Remote,
}

impl From<SourceBody> for ConfigSource {
    fn from(s: SourceBody) -> Self {
        match s {
            SourceBody::File => ConfigSource::File,
            SourceBody::Api => ConfigSource::Api,
            SourceBody::Remote => ConfigSource::Remote,
        }
    }
}

/// `ConfigResult` response (§4.I `POST|PUT /v1/config`).
#[derive(Debug, Serialize)]
pub struct ConfigResultBody {
    pub valid: bool,
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

/// `ValidationResult` response (§4.I `POST /v1/config/validate`).
#[derive(Debug, Serialize)]
pub struct ValidationResultBody {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// `GET /v1/config` response body: the current user [`Config`] with
/// `license_key` redacted (§4.I "current user Config (secrets redacted)").
#[derive(Debug, Serialize)]
pub struct RedactedConfig {
    #[serde(flatten)]
    pub config: serde_json::Value,
}

const REDACTED_PLACEHOLDER: &str = "********";

/// Produces the API-facing view of a [`Config`]: structurally identical,
/// with `license_key` replaced by a fixed placeholder.
pub fn redact_config(config: &Config) -> serde_json::Value {
    let mut value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("license_key".to_string(), serde_json::Value::String(REDACTED_PLACEHOLDER.to_string()));
    }
    value
}

#[derive(Debug, Serialize)]
pub struct ConfigHistoryEntry {
    pub version: u64,
    pub applied_at: DateTime<Utc>,
    pub source: String,
    pub author: String,
    pub description: String,
    pub hash: String,
    pub size: u64,
    pub metadata: std::collections::HashMap<String, String>,
}

impl From<&ConfigVersion> for ConfigHistoryEntry {
    fn from(v: &ConfigVersion) -> Self {
        Self {
            version: v.version,
            applied_at: v.created_at,
            source: v.source.clone(),
            author: v.author.clone(),
            description: v.description.clone(),
            hash: v.config_hash.clone(),
            size: v.size,
            metadata: v.metadata.clone(),
        }
    }
}

/// `POST /v1/control/reload` response is the raw [`ReloadResult`]; re-
/// exported here so handlers don't need to reach into `supervisor-service`
/// directly.
pub type ReloadResultBody = ReloadResult;

/// Generic success envelope for `/v1/control/restart`.
#[derive(Debug, Serialize)]
pub struct SuccessEnvelope {
    pub success: bool,
}

impl SuccessEnvelope {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
