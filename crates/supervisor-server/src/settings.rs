//! Runtime settings for the supervisor binary: layered file/env
//! configuration of the supervisor's *own* process, distinct from the user
//! [`supervisor_core::Config`] the supervisor manages on behalf of the
//! collector.
//!
//! A `config::Config::builder()` chain of defaults, an optional file, then
//! an env prefix, with CLI flags layered over the resulting settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `SUPERVISOR_*` environment variables and/or a settings file, layered
/// under the CLI flags in [`crate::cli::Cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub collector_binary_path: PathBuf,
    pub working_dir: PathBuf,
    pub initial_config_path: Option<PathBuf>,
    pub max_config_versions: usize,
    pub memory_limit_bytes: u64,
    pub health_check_interval_secs: u64,
    pub restart_check_interval_secs: u64,
    pub event_log_capacity: usize,

    pub auth_jwt_secret: Option<String>,
    pub auth_static_api_key: Option<String>,

    pub rate_limit_burst: u32,
    pub rate_limit_refill_per_interval: u32,
    pub rate_limit_interval_secs: u64,

    pub autoconfig_enabled: bool,
    pub autoconfig_scan_interval_secs: u64,
    /// `"low"`, `"medium"`, or `"high"` — the confidence floor discovered
    /// services must meet to be considered (§3 "confidence ∈
    /// {HIGH|MEDIUM|LOW}").
    pub autoconfig_min_confidence: String,
    pub remote_config_base_url: Option<String>,
    pub license_key: Option<String>,

    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            collector_binary_path: PathBuf::from("/usr/bin/otelcol-nr"),
            working_dir: PathBuf::from("/var/lib/supervisor"),
            initial_config_path: None,
            max_config_versions: 10,
            memory_limit_bytes: 512 * 1024 * 1024,
            health_check_interval_secs: 30,
            restart_check_interval_secs: 60,
            event_log_capacity: 1024,
            auth_jwt_secret: None,
            auth_static_api_key: None,
            rate_limit_burst: 60,
            rate_limit_refill_per_interval: 60,
            rate_limit_interval_secs: 60,
            autoconfig_enabled: false,
            autoconfig_scan_interval_secs: 300,
            autoconfig_min_confidence: "medium".to_string(),
            remote_config_base_url: None,
            license_key: None,
            log_json: false,
        }
    }
}

impl Settings {
    /// Layers, in increasing priority: built-in defaults, an optional TOML
    /// settings file, then `SUPERVISOR_*` environment variables.
    pub fn load(config_file: Option<&PathBuf>) -> anyhow::Result<Self> {
        let defaults = Settings::default();
        let mut builder = config::Config::builder()
            .set_default("bind_addr", defaults.bind_addr)?
            .set_default("collector_binary_path", defaults.collector_binary_path.to_string_lossy().to_string())?
            .set_default("working_dir", defaults.working_dir.to_string_lossy().to_string())?
            .set_default("max_config_versions", defaults.max_config_versions as i64)?
            .set_default("memory_limit_bytes", defaults.memory_limit_bytes as i64)?
            .set_default("health_check_interval_secs", defaults.health_check_interval_secs as i64)?
            .set_default("restart_check_interval_secs", defaults.restart_check_interval_secs as i64)?
            .set_default("event_log_capacity", defaults.event_log_capacity as i64)?
            .set_default("rate_limit_burst", defaults.rate_limit_burst as i64)?
            .set_default("rate_limit_refill_per_interval", defaults.rate_limit_refill_per_interval as i64)?
            .set_default("rate_limit_interval_secs", defaults.rate_limit_interval_secs as i64)?
            .set_default("autoconfig_enabled", defaults.autoconfig_enabled)?
            .set_default("autoconfig_scan_interval_secs", defaults.autoconfig_scan_interval_secs as i64)?
            .set_default("autoconfig_min_confidence", defaults.autoconfig_min_confidence)?
            .set_default("log_json", defaults.log_json)?;

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(config::Environment::with_prefix("SUPERVISOR").try_parsing(true).separator("__"));

        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn restart_check_interval(&self) -> Duration {
        Duration::from_secs(self.restart_check_interval_secs)
    }

    pub fn autoconfig_scan_interval(&self) -> Duration {
        Duration::from_secs(self.autoconfig_scan_interval_secs)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_interval_secs)
    }

    /// Parses `autoconfig_min_confidence` into the closed confidence level;
    /// falls back to `Medium` for an unrecognized value.
    pub fn autoconfig_min_confidence(&self) -> supervisor_core::Confidence {
        match self.autoconfig_min_confidence.to_ascii_lowercase().as_str() {
            "low" => supervisor_core::Confidence::Low,
            "high" => supervisor_core::Confidence::High,
            _ => supervisor_core::Confidence::Medium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file_or_env() {
        let settings = Settings::load(None).expect("defaults alone must be a valid layer");
        assert_eq!(settings.bind_addr, "127.0.0.1:8080");
        assert_eq!(settings.max_config_versions, 10);
    }
}
