//! Shared scaffolding for the root integration-test crate.

use std::path::PathBuf;
use std::time::Duration;

use supervisor_service::SupervisorConfig;

/// Path to the `healthy-collector` fixture binary built alongside this test
/// crate (see `tests/fixtures/healthy_collector.rs`). Answers every
/// `/health` request with a bare 200 forever.
pub fn healthy_collector_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_healthy-collector"))
}

/// Path to the `never-healthy-collector` fixture binary (see
/// `tests/fixtures/never_healthy_collector.rs`). Stays alive as a real
/// child process but never binds a health port.
pub fn never_healthy_collector_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_never-healthy-collector"))
}

pub const MINIMAL_YAML: &str = r#"
service:
  name: checkout-service
license_key: "0123456789012345678901234567890123456789"
"#;

pub fn supervisor_config(working_dir: PathBuf) -> SupervisorConfig {
    SupervisorConfig {
        collector_binary_path: healthy_collector_bin(),
        working_dir,
        max_config_versions: 10,
        memory_limit_bytes: 512 * 1024 * 1024,
        health_check_interval: Duration::from_secs(30),
        restart_check_interval: Duration::from_secs(60),
        event_log_capacity: 1024,
    }
}
