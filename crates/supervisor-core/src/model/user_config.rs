//! The user-supplied declarative configuration (§3 "User Configuration").
//!
//! This is the compact document an operator (or the auto-config orchestrator)
//! hands to the Config Engine. It is immutable once validated; a new edit is
//! always a new `Config` that supersedes the old one in the version history.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Top-level validated user configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate]
    pub service: ServiceConfig,
    /// New Relic license key.
    #[validate(length(min = 1))]
    pub license_key: String,
    #[serde(default)]
    #[validate]
    pub metrics: MetricsConfig,
    #[serde(default)]
    #[validate]
    pub traces: TracesConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    #[validate]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Collection interval, in seconds.
    #[validate(range(min = 1, max = 3600))]
    pub interval_secs: u64,
    pub host_metrics: bool,
    pub process_metrics: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            host_metrics: true,
            process_metrics: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, Validate)]
pub struct TracesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub sample_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LogsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub include_stdout: bool,
    #[serde(default)]
    pub include_stderr: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub redact_secrets: bool,
    #[serde(default)]
    pub redact_patterns: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            redact_secrets: true,
            redact_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, Validate)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    #[validate]
    pub cardinality: CardinalityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichConfig {
    pub add_host_metadata: bool,
    #[serde(default)]
    pub add_cloud_metadata: bool,
    #[serde(default)]
    pub add_k8s_metadata: bool,
    #[serde(default)]
    pub custom_tags: HashMap<String, String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            add_host_metadata: true,
            add_cloud_metadata: false,
            add_k8s_metadata: false,
            custom_tags: HashMap::new(),
        }
    }
}

impl EnrichConfig {
    pub fn any_enabled(&self) -> bool {
        self.add_host_metadata
            || self.add_cloud_metadata
            || self.add_k8s_metadata
            || !self.custom_tags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TransformConfig {
    #[serde(default)]
    pub convert_units: bool,
    #[serde(default)]
    pub aggregations: Vec<String>,
    #[serde(default)]
    pub calculations: Vec<String>,
}

impl TransformConfig {
    pub fn any_enabled(&self) -> bool {
        self.convert_units || !self.aggregations.is_empty() || !self.calculations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CardinalityLimitAction {
    #[default]
    Drop,
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CardinalityConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub global_limit: u64,
    #[serde(default)]
    pub per_metric: HashMap<String, u64>,
    #[serde(default)]
    pub limit_action: CardinalityLimitAction,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            global_limit: 100_000,
            per_metric: HashMap::new(),
            limit_action: CardinalityLimitAction::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Serialized input format accepted by the Schema Validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Yaml,
    Json,
}
