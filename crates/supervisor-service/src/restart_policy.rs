//! Restart Policy (4.F): bounded exponential backoff with success reset.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// §4.F "Policies: never, on_failure, always".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    Never,
    OnFailure,
    Always,
}

/// Exponential backoff schedule (§4.F defaults: initial 1s, multiplier 2.0,
/// max 5 min, max retries 10).
#[derive(Debug, Clone, Copy)]
pub struct BackoffSchedule {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5 * 60),
            max_retries: 10,
        }
    }
}

impl BackoffSchedule {
    /// `delay(n) = min(initial_delay · multiplier^n, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

struct PolicyState {
    mode: RestartMode,
    schedule: BackoffSchedule,
    attempt: u32,
}

/// Restart Policy (4.F). Internally mutable so a single instance can be
/// shared across the restart-monitoring loop without the caller juggling
/// its own lock.
pub struct RestartPolicy {
    state: Mutex<PolicyState>,
}

impl RestartPolicy {
    pub fn new(mode: RestartMode, schedule: BackoffSchedule) -> Self {
        Self {
            state: Mutex::new(PolicyState { mode, schedule, attempt: 0 }),
        }
    }

    pub fn on_failure_default() -> Self {
        Self::new(RestartMode::OnFailure, BackoffSchedule::default())
    }

    /// `next_delay() → (delay, should_restart)`. Does not consume an
    /// attempt by itself — callers pair this with `record_failure` when the
    /// restart attempt itself then fails, or `record_success` when it
    /// succeeds.
    pub async fn next_delay(&self) -> (Duration, bool) {
        let state = self.state.lock().await;
        if state.mode == RestartMode::Never {
            return (Duration::ZERO, false);
        }
        if state.attempt >= state.schedule.max_retries {
            return (Duration::ZERO, false);
        }
        (state.schedule.delay_for_attempt(state.attempt), true)
    }

    /// `record_success()` — resets the retry counter (§4.F).
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if state.attempt > 0 {
            debug!(previous_attempts = state.attempt, "restart policy reset after success");
        }
        state.attempt = 0;
    }

    /// `record_failure()` — increments the counter; returns `(0, false)`
    /// once the counter reaches `max_retries` (§4.F, §8 "Restart bound").
    pub async fn record_failure(&self) -> (Duration, bool) {
        let mut state = self.state.lock().await;
        if state.mode == RestartMode::Never {
            return (Duration::ZERO, false);
        }
        if state.attempt >= state.schedule.max_retries {
            info!(attempts = state.attempt, "restart policy exhausted");
            return (Duration::ZERO, false);
        }
        let delay = state.schedule.delay_for_attempt(state.attempt);
        state.attempt += 1;
        (delay, true)
    }

    pub async fn attempts(&self) -> u32 {
        self.state.lock().await.attempt
    }

    pub async fn mode(&self) -> RestartMode {
        self.state.lock().await.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(schedule.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(schedule.delay_for_attempt(2), Duration::from_secs(4));
        // 1 * 2^10 = 1024s > max_delay (300s), so it should cap.
        assert_eq!(schedule.delay_for_attempt(10), schedule.max_delay);
    }

    #[tokio::test]
    async fn never_mode_never_restarts() {
        let policy = RestartPolicy::new(RestartMode::Never, BackoffSchedule::default());
        let (_, should_restart) = policy.next_delay().await;
        assert!(!should_restart);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let schedule = BackoffSchedule {
            max_retries: 3,
            ..BackoffSchedule::default()
        };
        let policy = RestartPolicy::new(RestartMode::OnFailure, schedule);
        for _ in 0..3 {
            let (_, should_restart) = policy.record_failure().await;
            assert!(should_restart);
        }
        let (delay, should_restart) = policy.record_failure().await;
        assert!(!should_restart);
        assert_eq!(delay, Duration::ZERO);
        assert_eq!(policy.attempts().await, 3);
    }

    #[tokio::test]
    async fn success_resets_attempt_counter() {
        let policy = RestartPolicy::on_failure_default();
        policy.record_failure().await;
        policy.record_failure().await;
        assert_eq!(policy.attempts().await, 2);
        policy.record_success().await;
        assert_eq!(policy.attempts().await, 0);
    }
}
