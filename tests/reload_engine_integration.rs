//! End-to-end exercises of the Reload Engine (4.G) against real spawned
//! processes, covering blue-green continuity and rollback-on-reload-failure
//! without mocking `tokio::process::Command` itself.

mod common;

use std::time::Duration;

use supervisor_core::ConfigFormat;
use supervisor_service::config_engine::{ConfigEngine, ConfigSource, ConfigUpdate};
use supervisor_service::reload_engine::{CurrentProcessSlot, ReloadEngine};

fn apply_update() -> ConfigUpdate {
    ConfigUpdate {
        raw: common::MINIMAL_YAML.to_string(),
        format: ConfigFormat::Yaml,
        source: ConfigSource::Api,
        author: "integration-test".to_string(),
        description: "initial config".to_string(),
        dry_run: false,
    }
}

#[tokio::test]
async fn blue_green_happy_path_leaves_exactly_one_process_running() {
    let working_dir = tempfile::tempdir().expect("tempdir");
    let config_engine = ConfigEngine::new(10);
    let applied = config_engine.apply_config(apply_update()).await.expect("apply should succeed");
    assert_eq!(applied.version, Some(1));

    let engine = ReloadEngine::new(common::healthy_collector_bin(), working_dir.path().to_path_buf());
    let current: CurrentProcessSlot = tokio::sync::RwLock::new(None);

    let result = engine.blue_green(&config_engine, &current, None).await;

    assert!(result.success, "blue-green should succeed: {:?}", result.error);
    assert_eq!(result.new_version, Some(1));

    // §8 "Blue-green continuity": exactly one collector is running after a
    // successful reload, never zero.
    let guard = current.read().await;
    let process = guard.as_ref().expect("a process must be running after a successful blue-green swap");
    assert!(process.is_running().await);

    drop(guard);
    if let Some(process) = current.write().await.take() {
        let _ = process.stop(Duration::from_secs(5)).await;
    }
}

#[tokio::test]
async fn blue_green_failure_leaves_green_running_and_config_version_unchanged() {
    let working_dir = tempfile::tempdir().expect("tempdir");
    let config_engine = ConfigEngine::new(10);
    config_engine.apply_config(apply_update()).await.expect("apply should succeed");

    // Bring up a genuinely running "green" collector first (scenario 5:
    // "apply C1; wait running").
    let mut healthy_engine = ReloadEngine::new(common::healthy_collector_bin(), working_dir.path().to_path_buf());
    healthy_engine.health_wait_timeout = Duration::from_secs(5);
    let current: CurrentProcessSlot = tokio::sync::RwLock::new(None);
    let green = healthy_engine.blue_green(&config_engine, &current, None).await;
    assert!(green.success);
    let green_pid = current.read().await.as_ref().and_then(|p| p.pid());
    assert!(green_pid.is_some());

    // Now attempt a second reload whose blue candidate never becomes
    // healthy within a short ceiling (scenario 5: "C2 is syntactically
    // valid but the spawned blue never becomes healthy within 30s").
    let mut unhealthy_engine =
        ReloadEngine::new(common::never_healthy_collector_bin(), working_dir.path().to_path_buf());
    unhealthy_engine.health_wait_timeout = Duration::from_secs(2);

    let result = unhealthy_engine.blue_green(&config_engine, &current, Some(1)).await;

    assert!(!result.success, "reload should fail when blue never becomes healthy");
    assert_eq!(result.new_version, Some(1), "config_version must be unchanged after a failed reload");
    assert!(result.error.is_some());

    // Green must still be the process in the slot, and still running.
    let guard = current.read().await;
    let process = guard.as_ref().expect("green must still be running after the failed reload");
    assert_eq!(process.pid(), green_pid);
    assert!(process.is_running().await);
    drop(guard);

    if let Some(process) = current.write().await.take() {
        let _ = process.stop(Duration::from_secs(5)).await;
    }
}
