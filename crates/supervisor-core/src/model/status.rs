//! Collector and health status types (§3 "Collector Status", "Health Status").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorState {
    Starting,
    Running,
    Reloading,
    Degraded,
    Stopping,
    Stopped,
    Crashed,
    /// Restart budget exhausted; the collector will not be retried without
    /// operator intervention (§3 "Collector Status" `failed`).
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorStatus {
    pub state: CollectorState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
    pub config_version: Option<u64>,
    pub rss_bytes: Option<u64>,
}

impl Default for CollectorStatus {
    fn default() -> Self {
        Self {
            state: CollectorState::Stopped,
            pid: None,
            started_at: None,
            restart_count: 0,
            last_exit_code: None,
            config_version: None,
            rss_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            state: HealthState::Unknown,
            consecutive_failures: 0,
            last_check_at: None,
            last_error: None,
        }
    }
}
