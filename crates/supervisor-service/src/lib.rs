//! Process supervision, blue-green reload, and auto-configuration
//! orchestration for the host telemetry supervisor.
//!
//! Builds on `supervisor-core`'s pure configuration pipeline with everything
//! that needs a clock, a filesystem, a child process or the network: the
//! Config Engine (4.C), Collector Process (4.D), Health Checker (4.E),
//! Restart Policy (4.F), Reload Engine (4.G), Supervisor Core (4.H), and the
//! `adapters` module holding the Discovery Client (4.J), Remote Config
//! Client (4.K) and Auto-config Orchestrator (4.L).

pub mod adapters;
pub mod collector_process;
pub mod config_engine;
pub mod error;
pub mod health_checker;
pub mod reload_engine;
pub mod restart_policy;
pub mod supervisor;

pub use adapters::autoconfig::{AutoConfigOrchestrator, AutoConfigSettings};
pub use adapters::discovery::{DiscoveryProvider, StaticDiscoveryProvider};
pub use adapters::remote_config::{BaselineReport, RemoteConfigClient, RemoteConfigClientConfig};
pub use collector_process::{CollectorProcess, CollectorSignal, CollectorSpawnSpec};
pub use config_engine::{ConfigEngine, ConfigResult, ConfigSource, ConfigUpdate, ValidationResult};
pub use error::{SupervisorError, SupervisorResult};
pub use health_checker::{HealthCheckConfig, HealthChecker};
pub use reload_engine::{ReloadEngine, ReloadResult, ReloadStrategy};
pub use restart_policy::{BackoffSchedule, RestartMode, RestartPolicy};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorState};
