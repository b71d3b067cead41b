//! Config Engine (4.C): orchestrates the Schema Validator and Config
//! Generator, owns the current user [`Config`] and the [`VersionHistory`].
//!
//! All mutations are serialized through a single `tokio::sync::RwLock`
//! (§5 "Config-engine operations are strictly serialized"); reads take the
//! shared side of the same lock so a reader never observes a half-applied
//! update.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use supervisor_core::{
    generate, generate_with_services, validate, Config, ConfigError, ConfigFormat, ConfigVersion,
    DiscoveredService, FieldError, GeneratedConfig, NewVersion, VersionHistory,
};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::error::{SupervisorError, SupervisorResult};

/// Default cap on retained config versions (§3 "capped at MaxVersions...
/// default 10").
pub const DEFAULT_MAX_VERSIONS: usize = 10;

/// Where a config update originated, per §3 "Config Version".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    File,
    Api,
    Remote,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::File => "file",
            ConfigSource::Api => "api",
            ConfigSource::Remote => "remote",
        }
    }
}

/// Request body for `apply_config` (§4.C).
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub raw: String,
    pub format: ConfigFormat,
    pub source: ConfigSource,
    pub author: String,
    pub description: String,
    pub dry_run: bool,
}

/// Outcome of `apply_config` / `process_user_config`.
#[derive(Debug, Clone)]
pub struct ConfigResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
    pub version: Option<u64>,
    pub generated: Option<GeneratedConfig>,
}

impl ConfigResult {
    fn invalid(errors: Vec<FieldError>) -> Self {
        Self { valid: false, errors, version: None, generated: None }
    }

    fn valid(version: Option<u64>, generated: GeneratedConfig) -> Self {
        Self { valid: true, errors: Vec::new(), version, generated: Some(generated) }
    }
}

/// Pure validation result (`/v1/config/validate`, §4.I).
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

struct EngineState {
    current_config: Option<Config>,
    current_generated: Option<GeneratedConfig>,
    history: VersionHistory,
}

/// Config Engine (4.C). Cheap to clone (wraps an `Arc`); every clone shares
/// the same lock and the same history.
#[derive(Clone)]
pub struct ConfigEngine {
    state: Arc<RwLock<EngineState>>,
}

impl ConfigEngine {
    pub fn new(max_versions: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(EngineState {
                current_config: None,
                current_generated: None,
                history: VersionHistory::new(max_versions),
            })),
        }
    }

    /// `process_user_config(bytes, format) → GeneratedConfig` (4.C).
    ///
    /// Validates then generates, holding the write lock for the whole call
    /// so a concurrent reader never observes a config without its generated
    /// counterpart.
    #[instrument(skip(self, raw))]
    pub async fn process_user_config(
        &self,
        raw: &str,
        format: ConfigFormat,
    ) -> SupervisorResult<(Config, GeneratedConfig)> {
        let config = validate(raw, format)?;
        let generated = generate(&config)?;

        let mut state = self.state.write().await;
        state.current_config = Some(config.clone());
        state.current_generated = Some(generated.clone());

        Ok((config, generated))
    }

    /// `validate_config(bytes) → ValidationResult` (4.C). Read-only.
    #[instrument(skip(self, raw))]
    pub async fn validate_config(&self, raw: &str, format: ConfigFormat) -> ValidationResult {
        match validate(raw, format) {
            Ok(_) => ValidationResult { valid: true, errors: Vec::new() },
            Err(ConfigError::Invalid(errors)) => ValidationResult { valid: false, errors },
            Err(other) => ValidationResult {
                valid: false,
                errors: vec![FieldError::new("/", other.to_string(), other.code())],
            },
        }
    }

    /// `apply_config(update) → ConfigResult` (4.C).
    ///
    /// A `dry_run` update runs validation (and, if it passes, generation) but
    /// never mutates `current_config`/`current_generated` or appends to
    /// history — it shares the validation path with `process_user_config`
    /// only up to that point.
    #[instrument(skip(self, update), fields(source = update.source.as_str(), dry_run = update.dry_run))]
    pub async fn apply_config(&self, update: ConfigUpdate) -> SupervisorResult<ConfigResult> {
        let config = match validate(&update.raw, update.format) {
            Ok(c) => c,
            Err(ConfigError::Invalid(errors)) => return Ok(ConfigResult::invalid(errors)),
            Err(other) => return Err(other.into()),
        };

        let generated = generate(&config)?;

        if update.dry_run {
            info!("dry-run apply validated successfully, no state mutated");
            return Ok(ConfigResult { valid: true, errors: Vec::new(), version: None, generated: Some(generated) });
        }

        let size = generated.to_canonical_yaml().map(|y| y.len() as u64).unwrap_or(0);
        let mut state = self.state.write().await;
        state.current_config = Some(config.clone());
        state.current_generated = Some(generated.clone());
        let entry = state.history.push(
            config,
            NewVersion {
                config_hash: generated.hash.clone(),
                source: update.source.as_str().to_string(),
                author: update.author.clone(),
                description: update.description.clone(),
                size,
                metadata: HashMap::new(),
            },
        );

        info!(version = entry.version, "applied new configuration version");
        Ok(ConfigResult::valid(Some(entry.version), generated))
    }

    /// `get_current_config() → Config` (4.C). `CONFIG_MISSING` if none
    /// loaded yet.
    #[instrument(skip(self))]
    pub async fn get_current_config(&self) -> SupervisorResult<Config> {
        let state = self.state.read().await;
        state.current_config.clone().ok_or_else(|| ConfigError::Missing.into())
    }

    /// The current generated config, regenerated fresh every time a reload
    /// needs it (4.G step 2: "Regenerate a fresh GeneratedConfig").
    #[instrument(skip(self))]
    pub async fn regenerate_current(&self) -> SupervisorResult<GeneratedConfig> {
        let config = self.get_current_config().await?;
        let generated = generate(&config)?;
        let mut state = self.state.write().await;
        state.current_generated = Some(generated.clone());
        Ok(generated)
    }

    #[instrument(skip(self))]
    pub async fn current_generated(&self) -> Option<GeneratedConfig> {
        self.state.read().await.current_generated.clone()
    }

    /// Regenerates the current config with discovered services layered in
    /// as per-service receivers (4.L step 4: "integrate the returned
    /// integrations into a generated config"; 4.B "invoked from the
    /// auto-config path").
    #[instrument(skip(self, services))]
    pub async fn regenerate_with_services(
        &self,
        services: &[DiscoveredService],
    ) -> SupervisorResult<GeneratedConfig> {
        let config = self.get_current_config().await?;
        let generated = generate_with_services(&config, services)?;
        let mut state = self.state.write().await;
        state.current_generated = Some(generated.clone());
        Ok(generated)
    }

    /// `get_config_history(limit) → [ConfigVersion]` (4.C). Oldest-first
    /// within the returned window.
    #[instrument(skip(self))]
    pub async fn get_config_history(&self, limit: usize) -> Vec<ConfigVersion> {
        let state = self.state.read().await;
        let all = state.history.all();
        let start = all.len().saturating_sub(limit);
        all[start..].to_vec()
    }

    /// `rollback_config(version) → void` (4.C).
    ///
    /// Marking `version` current here is a pure metadata
    /// operation; the caller (Supervisor Core) is responsible for driving
    /// the blue-green reload that actually makes it live.
    #[instrument(skip(self))]
    pub async fn rollback_config(&self, version: u64) -> SupervisorResult<GeneratedConfig> {
        let mut state = self.state.write().await;
        let entry = state
            .history
            .get(version)
            .cloned()
            .ok_or(SupervisorError::VersionNotFound(version))?;

        let generated = generate(&entry.config)?;
        state.current_config = Some(entry.config.clone());
        state.current_generated = Some(generated.clone());
        // Rollback does not append a new version; it re-points "current" at
        // an existing one. The history itself is append-only (§3).
        warn!(version, "rolled back to previous configuration version");
        Ok(generated)
    }

    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
service:
  name: svc
license_key: "X"
"#;

    fn update(raw: &str, dry_run: bool) -> ConfigUpdate {
        ConfigUpdate {
            raw: raw.to_string(),
            format: ConfigFormat::Yaml,
            source: ConfigSource::Api,
            author: "tester".to_string(),
            description: "test update".to_string(),
            dry_run,
        }
    }

    #[tokio::test]
    async fn minimal_apply_produces_version_one() {
        let engine = ConfigEngine::new(DEFAULT_MAX_VERSIONS);
        let result = engine.apply_config(update(MINIMAL_YAML, false)).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.version, Some(1));
        let generated = result.generated.unwrap();
        assert!(generated.receivers.contains_key("hostmetrics"));
    }

    #[tokio::test]
    async fn dry_run_does_not_mutate_state() {
        let engine = ConfigEngine::new(DEFAULT_MAX_VERSIONS);
        let result = engine.apply_config(update(MINIMAL_YAML, true)).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.version, None);
        assert_eq!(engine.history_len().await, 0);
        assert!(engine.get_current_config().await.is_err());
    }

    #[tokio::test]
    async fn dry_run_invalid_update_reports_errors_without_mutation() {
        let engine = ConfigEngine::new(DEFAULT_MAX_VERSIONS);
        let result = engine.apply_config(update("service:\n  name: \"\"\n", true)).await.unwrap();
        assert!(!result.valid);
        assert!(!result.errors.is_empty());
        assert_eq!(engine.history_len().await, 0);
    }

    #[tokio::test]
    async fn history_is_capped_and_versions_keep_increasing() {
        let engine = ConfigEngine::new(2);
        for _ in 0..4 {
            engine.apply_config(update(MINIMAL_YAML, false)).await.unwrap();
        }
        let history = engine.get_config_history(10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().version, 4);
    }

    #[tokio::test]
    async fn rollback_to_missing_version_fails() {
        let engine = ConfigEngine::new(DEFAULT_MAX_VERSIONS);
        engine.apply_config(update(MINIMAL_YAML, false)).await.unwrap();
        let err = engine.rollback_config(99).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn rollback_to_present_version_regenerates_config() {
        let engine = ConfigEngine::new(DEFAULT_MAX_VERSIONS);
        engine.apply_config(update(MINIMAL_YAML, false)).await.unwrap();
        let generated = engine.rollback_config(1).await.unwrap();
        assert!(generated.receivers.contains_key("hostmetrics"));
    }
}
