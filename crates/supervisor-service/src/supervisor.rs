//! Supervisor Core (4.H): wires the Schema Validator/Config Generator
//! (`supervisor-core`), Config Engine, Collector Process, Health Checker,
//! Restart Policy and Reload Engine together, owns all mutable runtime
//! state, and publishes the event stream the control-plane API (4.I) reads.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use supervisor_core::{CollectorState, CollectorStatus, ConfigFormat, ConfigVersion, Event, EventLog, EventRecord, HealthState, HealthStatus as CoreHealthStatus};
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::config_engine::{ConfigEngine, ConfigResult as EngineConfigResult, ConfigSource, ConfigUpdate, ValidationResult, DEFAULT_MAX_VERSIONS};
use crate::error::{SupervisorError, SupervisorResult};
use crate::health_checker::tokio_util_shim::CancellationToken;
use crate::health_checker::{HealthCheckConfig, HealthChecker};
use crate::reload_engine::{CurrentProcessSlot, ReloadEngine, ReloadResult, ReloadStrategy};
use crate::restart_policy::RestartPolicy;

/// §4.H state machine: `stopped → starting → running → (stopping|failed) →
/// stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl From<SupervisorState> for CollectorState {
    fn from(s: SupervisorState) -> Self {
        match s {
            SupervisorState::Stopped => CollectorState::Stopped,
            SupervisorState::Starting => CollectorState::Starting,
            SupervisorState::Running => CollectorState::Running,
            SupervisorState::Stopping => CollectorState::Stopping,
            SupervisorState::Failed => CollectorState::Failed,
        }
    }
}

/// Runtime tuning the binary (`supervisor-server`) loads from file/env and
/// hands to the supervisor at construction.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub collector_binary_path: PathBuf,
    pub working_dir: PathBuf,
    pub max_config_versions: usize,
    pub memory_limit_bytes: u64,
    pub health_check_interval: Duration,
    pub restart_check_interval: Duration,
    pub event_log_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            collector_binary_path: PathBuf::from("/usr/bin/otelcol-nr"),
            working_dir: PathBuf::from("/var/lib/supervisor"),
            max_config_versions: DEFAULT_MAX_VERSIONS,
            memory_limit_bytes: 512 * 1024 * 1024,
            health_check_interval: Duration::from_secs(30),
            restart_check_interval: Duration::from_secs(60),
            event_log_capacity: 1024,
        }
    }
}

struct MutableState {
    state: SupervisorState,
    ready: bool,
    collector_status: CollectorStatus,
    health_status: CoreHealthStatus,
    config_version: Option<u64>,
}

/// Supervisor Core (4.H). Cheap to clone — every field is an `Arc` — so the
/// control-plane API can hold its own handle without borrowing lifetimes.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    config_engine: ConfigEngine,
    reload_engine: Arc<ReloadEngine>,
    current: Arc<CurrentProcessSlot>,
    restart_policy: Arc<RestartPolicy>,
    reload_lock: Arc<tokio::sync::Mutex<()>>,
    events: Arc<RwLock<EventLog>>,
    mutable: Arc<RwLock<MutableState>>,
    restart_count: Arc<AtomicU32>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let reload_engine = Arc::new(ReloadEngine::new(
            config.collector_binary_path.clone(),
            config.working_dir.clone(),
        ));
        Self {
            config_engine: ConfigEngine::new(config.max_config_versions),
            reload_engine,
            current: Arc::new(RwLock::new(None)),
            restart_policy: Arc::new(RestartPolicy::on_failure_default()),
            reload_lock: Arc::new(tokio::sync::Mutex::new(())),
            events: Arc::new(RwLock::new(EventLog::new(config.event_log_capacity))),
            mutable: Arc::new(RwLock::new(MutableState {
                state: SupervisorState::Stopped,
                ready: false,
                collector_status: CollectorStatus::default(),
                health_status: CoreHealthStatus::default(),
                config_version: None,
            })),
            restart_count: Arc::new(AtomicU32::new(0)),
            cancel: CancellationToken::new(),
            config: Arc::new(config),
        }
    }

    async fn record_event(&self, event: Event) -> EventRecord {
        let mut log = self.events.write().await;
        log.push(event)
    }

    /// Startup sequence (4.H): load initial config if present, bring up the
    /// first collector via a graceful reload, then launch the health and
    /// restart monitoring loops.
    #[instrument(skip(self, initial_config))]
    pub async fn start(&self, initial_config: Option<(String, ConfigFormat)>) -> SupervisorResult<()> {
        {
            let mut state = self.mutable.write().await;
            state.state = SupervisorState::Starting;
        }

        if let Some((raw, format)) = initial_config {
            let update = ConfigUpdate {
                raw,
                format,
                source: ConfigSource::File,
                author: "supervisor".to_string(),
                description: "initial startup configuration".to_string(),
                dry_run: false,
            };
            match self.config_engine.apply_config(update).await {
                Ok(result) if result.valid => {
                    self.record_event(Event::ConfigValidated { version: result.version.unwrap_or(0) }).await;
                }
                Ok(result) => {
                    self.record_event(Event::ConfigRejected { errors: result.errors.len() }).await;
                    let mut state = self.mutable.write().await;
                    state.state = SupervisorState::Failed;
                    return Err(supervisor_core::ConfigError::Invalid(result.errors).into());
                }
                Err(e) => {
                    let mut state = self.mutable.write().await;
                    state.state = SupervisorState::Failed;
                    return Err(e);
                }
            }
        }

        if self.config_engine.get_current_config().await.is_ok() {
            let result = self.reload_engine.graceful(&self.config_engine, &self.current, None).await;
            self.apply_reload_result(&result).await;
            if !result.success {
                let mut state = self.mutable.write().await;
                state.state = SupervisorState::Failed;
                return Err(SupervisorError::ReloadFailed(
                    result.error.unwrap_or_else(|| "startup reload failed".to_string()),
                ));
            }
        }

        {
            let mut state = self.mutable.write().await;
            state.state = SupervisorState::Running;
            state.ready = true;
        }
        self.record_event(Event::CollectorStarted {
            pid: self.current_pid().await.unwrap_or(0),
        })
        .await;

        self.spawn_health_loop();
        self.spawn_restart_loop();
        info!("supervisor startup sequence complete");
        Ok(())
    }

    async fn current_pid(&self) -> Option<u32> {
        self.current.read().await.as_ref().and_then(|p| p.pid())
    }

    async fn apply_reload_result(&self, result: &ReloadResult) {
        let mut state = self.mutable.write().await;
        if result.success {
            // §9 REDESIGN FLAGS: in_place never advances config_version here;
            // that only happens once a health sample confirms the child.
            if result.strategy != ReloadStrategy::InPlace {
                state.config_version = result.new_version;
                state.collector_status.config_version = result.new_version;
            }
        }
    }

    /// Graceful orderly shutdown: stop the child, then mark ourselves
    /// stopped (4.H "Signal handling... graceful-termination signal
    /// triggers orderly shutdown of child then self").
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        {
            let mut state = self.mutable.write().await;
            state.state = SupervisorState::Stopping;
        }
        self.cancel.cancel();
        if let Some(process) = self.current.write().await.take() {
            let _ = process.stop(self.reload_engine.stop_timeout).await;
        }
        self.record_event(Event::CollectorExited { exit_code: None }).await;
        let mut state = self.mutable.write().await;
        state.state = SupervisorState::Stopped;
        state.ready = false;
    }

    /// Forward `HUP` to the child and record a reload event (4.H "reload-
    /// signal forwards HUP to the child").
    #[instrument(skip(self))]
    pub async fn handle_reload_signal(&self) {
        let result = self.reload_engine.in_place(&self.current, self.config_version().await).await;
        self.record_event(Event::ReloadStarted {
            strategy: "in_place".to_string(),
            from_version: result.old_version.unwrap_or(0),
            to_version: result.new_version.unwrap_or(0),
        })
        .await;
    }

    pub async fn config_version(&self) -> Option<u64> {
        self.mutable.read().await.config_version
    }

    /// `GET /v1/status` source of truth.
    #[instrument(skip(self))]
    pub async fn status(&self) -> CollectorStatus {
        let mut status = self.mutable.read().await.collector_status.clone();
        status.state = self.mutable.read().await.state.into();
        status.pid = self.current_pid().await;
        status.restart_count = self.restart_count.load(Ordering::SeqCst);
        if let Some(process) = self.current.read().await.as_ref() {
            if let Ok((_, rss)) = process.check_memory(self.config.memory_limit_bytes).await {
                status.rss_bytes = Some(rss);
            }
        }
        status
    }

    /// `GET /health` source of truth: a single check against the live
    /// collector's health endpoint, translated into the §3 "Health Status"
    /// shape.
    #[instrument(skip(self))]
    pub async fn health(&self) -> CoreHealthStatus {
        let Some(process) = self.current.read().await.as_ref().cloned() else {
            return CoreHealthStatus {
                state: HealthState::Unknown,
                consecutive_failures: 0,
                last_check_at: Some(chrono::Utc::now()),
                last_error: Some("no collector process running".to_string()),
            };
        };
        let checker = HealthChecker::new(HealthCheckConfig::for_port(process.health_port()));
        match checker.check().await {
            Ok(()) => CoreHealthStatus {
                state: HealthState::Healthy,
                consecutive_failures: 0,
                last_check_at: Some(chrono::Utc::now()),
                last_error: None,
            },
            Err(e) => CoreHealthStatus {
                state: HealthState::Unhealthy,
                consecutive_failures: 1,
                last_check_at: Some(chrono::Utc::now()),
                last_error: Some(e.to_string()),
            },
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.mutable.read().await.ready
    }

    pub async fn state(&self) -> SupervisorState {
        self.mutable.read().await.state
    }

    pub async fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        self.events.read().await.recent(limit)
    }

    // ---- Config Engine passthroughs (4.C via 4.I) ----

    #[instrument(skip(self, update))]
    pub async fn apply_config(&self, update: ConfigUpdate) -> SupervisorResult<EngineConfigResult> {
        let dry_run = update.dry_run;
        let result = self.config_engine.apply_config(update).await?;
        if !dry_run {
            if result.valid {
                self.record_event(Event::ConfigValidated { version: result.version.unwrap_or(0) }).await;
                // A config change on a running supervisor is applied via
                // blue-green (§2 data flow: "user config ... → G (blue-
                // green)"), never by mutating the live child in place.
                self.reload(ReloadStrategy::BlueGreen).await;
            } else {
                self.record_event(Event::ConfigRejected { errors: result.errors.len() }).await;
            }
        }
        Ok(result)
    }

    pub async fn validate_config(&self, raw: &str, format: ConfigFormat) -> ValidationResult {
        self.config_engine.validate_config(raw, format).await
    }

    pub async fn get_current_config(&self) -> SupervisorResult<supervisor_core::Config> {
        self.config_engine.get_current_config().await
    }

    pub async fn get_config_history(&self, limit: usize) -> Vec<ConfigVersion> {
        self.config_engine.get_config_history(limit).await
    }

    /// Rollback (4.C + §9 Open Question resolution): re-points "current" at
    /// a prior version, then drives the blue-green reload synchronously so
    /// the live collector actually reflects it.
    #[instrument(skip(self))]
    pub async fn rollback(&self, version: u64) -> SupervisorResult<ReloadResult> {
        self.config_engine.rollback_config(version).await?;
        Ok(self.reload(ReloadStrategy::BlueGreen).await)
    }

    /// `POST /v1/control/reload` (4.I), default strategy blue-green.
    #[instrument(skip(self))]
    pub async fn reload(&self, strategy: ReloadStrategy) -> ReloadResult {
        let _guard = self.reload_lock.lock().await;
        let from_version = self.config_version().await;

        self.record_event(Event::ReloadStarted {
            strategy: format!("{strategy:?}"),
            from_version: from_version.unwrap_or(0),
            to_version: 0,
        })
        .await;

        let result = match strategy {
            ReloadStrategy::BlueGreen => {
                self.reload_engine.blue_green(&self.config_engine, &self.current, from_version).await
            }
            ReloadStrategy::Graceful => {
                self.reload_engine.graceful(&self.config_engine, &self.current, from_version).await
            }
            ReloadStrategy::InPlace => self.reload_engine.in_place(&self.current, from_version).await,
        };

        self.apply_reload_result(&result).await;

        if result.success {
            self.record_event(Event::ReloadSucceeded {
                strategy: format!("{strategy:?}"),
                to_version: result.new_version.unwrap_or(0),
                duration_ms: result.duration_ms,
            })
            .await;
        } else {
            self.record_event(Event::ReloadFailed {
                strategy: format!("{strategy:?}"),
                reason: result.error.clone().unwrap_or_default(),
            })
            .await;
        }

        result
    }

    /// Driven by the auto-config orchestrator (4.L step 4): regenerates the
    /// current config with `services` layered in as per-service receivers
    /// and applies it via the same blue-green path as a user-initiated
    /// reload, under the same `reload_lock` so it can never interleave with
    /// a concurrent `/v1/control/reload`.
    #[instrument(skip(self, services))]
    pub async fn apply_auto_config(
        &self,
        services: &[supervisor_core::DiscoveredService],
    ) -> ReloadResult {
        for service in services {
            self.record_event(Event::DiscoveryServiceFound {
                service_type: service.service_type.as_str().to_string(),
                endpoint: service.primary_endpoint().unwrap_or_default(),
            })
            .await;
        }

        let _guard = self.reload_lock.lock().await;
        let from_version = self.config_version().await;

        self.record_event(Event::ReloadStarted {
            strategy: "BlueGreen".to_string(),
            from_version: from_version.unwrap_or(0),
            to_version: 0,
        })
        .await;

        let result = self
            .reload_engine
            .blue_green_with_services(&self.config_engine, &self.current, from_version, services)
            .await;

        self.apply_reload_result(&result).await;

        if result.success {
            self.record_event(Event::ReloadSucceeded {
                strategy: "BlueGreen".to_string(),
                to_version: result.new_version.unwrap_or(0),
                duration_ms: result.duration_ms,
            })
            .await;
        } else {
            self.record_event(Event::ReloadFailed {
                strategy: "BlueGreen".to_string(),
                reason: result.error.clone().unwrap_or_default(),
            })
            .await;
        }

        result
    }

    /// Records the Remote Config Client's (4.K) verdict on a fetched
    /// configuration, independent of the `ReloadStarted`/`Succeeded`/`Failed`
    /// trio `apply_auto_config` already emits for the blue-green reload
    /// itself. Called by the Auto-config Orchestrator (4.L) once per cycle
    /// that actually reaches the remote config client.
    pub async fn record_remote_config_outcome(&self, outcome: supervisor_core::RemoteConfigOutcome, version: u64) {
        match outcome {
            supervisor_core::RemoteConfigOutcome::Applied => {
                self.record_event(Event::RemoteConfigApplied { version }).await;
            }
            supervisor_core::RemoteConfigOutcome::RejectedBadSignature => {
                self.record_event(Event::RemoteConfigRejected { reason: "bad signature".to_string() }).await;
            }
            supervisor_core::RemoteConfigOutcome::RejectedExpired => {
                self.record_event(Event::RemoteConfigRejected { reason: "expired".to_string() }).await;
            }
            supervisor_core::RemoteConfigOutcome::RejectedInvalidConfig => {
                self.record_event(Event::RemoteConfigRejected { reason: "invalid config".to_string() }).await;
            }
        };
    }

    /// `POST /v1/control/restart` (4.I): stop then graceful-start the
    /// current collector with its existing config.
    #[instrument(skip(self))]
    pub async fn restart(&self) -> ReloadResult {
        self.restart_count.fetch_add(1, Ordering::SeqCst);
        self.reload(ReloadStrategy::Graceful).await
    }

    fn spawn_health_loop(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    _ = tokio::time::sleep(this.config.health_check_interval) => {}
                }
                let health = this.health().await;
                if health.state == HealthState::Unhealthy {
                    this.record_event(Event::HealthCheckFailed {
                        reason: health.last_error.clone().unwrap_or_default(),
                    })
                    .await;
                    warn!("health check unhealthy, triggering graceful reload");
                    this.reload(ReloadStrategy::Graceful).await;
                } else if health.state == HealthState::Healthy {
                    let mut state = this.mutable.write().await;
                    if state.health_status.state != HealthState::Healthy {
                        this.record_event(Event::HealthRecovered).await;
                    }
                    state.health_status = health;
                }
            }
        });
    }

    fn spawn_restart_loop(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    _ = tokio::time::sleep(this.config.restart_check_interval) => {}
                }

                let running = this.current.read().await.as_ref().cloned();
                let Some(process) = running else { continue };

                if process.is_running().await {
                    // Memory ceiling check (§5 resource limits).
                    if let Ok((exceeded, rss)) = process.check_memory(this.config.memory_limit_bytes).await {
                        if exceeded {
                            warn!(rss, limit = this.config.memory_limit_bytes, "memory ceiling exceeded");
                            this.record_event(Event::HealthCheckFailed {
                                reason: "memory_limit_exceeded".to_string(),
                            })
                            .await;
                            let _ = process.stop(this.reload_engine.stop_timeout).await;
                            this.current.write().await.take();
                            this.handle_unexpected_exit(process.last_exit_code().await).await;
                        }
                    }
                    continue;
                }

                // `is_running` already reaped the child internally; drop our
                // own stale pointer before restarting.
                this.current.write().await.take();
                this.handle_unexpected_exit(process.last_exit_code().await).await;
            }
        });
    }

    /// Consults the restart policy on an unexpected exit (or memory-ceiling
    /// breach) and either restarts the collector or, once the policy is
    /// exhausted, fails the supervisor (4.H, §7 "Restart policy exhausted").
    #[instrument(skip(self))]
    async fn handle_unexpected_exit(&self, exit_code: Option<i32>) {
        self.record_event(Event::CollectorCrashed { exit_code, signal: None }).await;

        let (delay, should_restart) = self.restart_policy.record_failure().await;
        if !should_restart {
            let attempts = self.restart_policy.attempts().await;
            error!(attempts, "restart policy exhausted, transitioning to failed");
            self.record_event(Event::RestartExhausted { attempts }).await;
            let mut state = self.mutable.write().await;
            state.state = SupervisorState::Failed;
            state.ready = false;
            return;
        }

        self.restart_count.fetch_add(1, Ordering::SeqCst);
        self.record_event(Event::RestartScheduled {
            attempt: self.restart_policy.attempts().await,
            delay_ms: delay.as_millis() as u64,
        })
        .await;

        tokio::time::sleep(delay).await;

        let result = self.reload_engine.graceful(&self.config_engine, &self.current, self.config_version().await).await;
        if result.success {
            self.restart_policy.record_success().await;
            self.apply_reload_result(&result).await;
            self.record_event(Event::CollectorStarted {
                pid: self.current_pid().await.unwrap_or(0),
            })
            .await;
        } else {
            warn!(error = ?result.error, "restart attempt failed");
        }
    }
}
