//! Supervisor events and the bounded event log (§3 "Event", §5 resource
//! limits on retained event history).
//!
//! A ring buffer that drops the oldest entry on overflow: the log itself is
//! the source of truth for `/v1/status`, with no downstream sink to flush to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    CollectorStarted { pid: u32 },
    CollectorExited { exit_code: Option<i32> },
    CollectorCrashed { exit_code: Option<i32>, signal: Option<i32> },
    RestartScheduled { attempt: u32, delay_ms: u64 },
    RestartExhausted { attempts: u32 },
    HealthCheckFailed { reason: String },
    HealthRecovered,
    ConfigValidated { version: u64 },
    ConfigRejected { errors: usize },
    ReloadStarted { strategy: String, from_version: u64, to_version: u64 },
    ReloadSucceeded { strategy: String, to_version: u64, duration_ms: u64 },
    ReloadFailed { strategy: String, reason: String },
    ReloadRolledBack { to_version: u64, reason: String },
    RemoteConfigApplied { version: u64 },
    RemoteConfigRejected { reason: String },
    DiscoveryServiceFound { service_type: String, endpoint: String },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::CollectorStarted { .. } => "collector_started",
            Event::CollectorExited { .. } => "collector_exited",
            Event::CollectorCrashed { .. } => "collector_crashed",
            Event::RestartScheduled { .. } => "restart_scheduled",
            Event::RestartExhausted { .. } => "restart_exhausted",
            Event::HealthCheckFailed { .. } => "health_check_failed",
            Event::HealthRecovered => "health_recovered",
            Event::ConfigValidated { .. } => "config_validated",
            Event::ConfigRejected { .. } => "config_rejected",
            Event::ReloadStarted { .. } => "reload_started",
            Event::ReloadSucceeded { .. } => "reload_succeeded",
            Event::ReloadFailed { .. } => "reload_failed",
            Event::ReloadRolledBack { .. } => "reload_rolled_back",
            Event::RemoteConfigApplied { .. } => "remote_config_applied",
            Event::RemoteConfigRejected { .. } => "remote_config_rejected",
            Event::DiscoveryServiceFound { .. } => "discovery_service_found",
        }
    }
}

/// A logged event with its sequence number and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

/// Fixed-capacity event log. Oldest entries are dropped once `capacity` is
/// reached; `seq` keeps climbing regardless of eviction so callers can detect
/// gaps.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<EventRecord>,
    capacity: usize,
    next_seq: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_seq: 1,
        }
    }

    pub fn push(&mut self, event: Event) -> EventRecord {
        let record = EventRecord {
            seq: self.next_seq,
            at: Utc::now(),
            event,
        };
        self.next_seq += 1;
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record.clone());
        record
    }

    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        self.entries.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_on_overflow() {
        let mut log = EventLog::new(2);
        log.push(Event::HealthRecovered);
        log.push(Event::RestartExhausted { attempts: 1 });
        let third = log.push(Event::HealthCheckFailed { reason: "timeout".into() });
        assert_eq!(log.len(), 2);
        assert_eq!(third.seq, 3);
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].seq, 2);
        assert_eq!(recent[1].seq, 3);
    }
}
