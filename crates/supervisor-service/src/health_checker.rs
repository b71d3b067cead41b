//! Health Checker (4.E): polls a collector's health endpoint and turns raw
//! HTTP outcomes into the healthy/unhealthy state the Reload Engine and
//! Supervisor Core act on.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util_shim::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{SupervisorError, SupervisorResult};

/// Health Checker configuration (4.E).
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub endpoint: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
}

impl HealthCheckConfig {
    pub fn for_port(port: u16) -> Self {
        Self {
            endpoint: format!("http://127.0.0.1:{port}/health"),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

/// A single collector's health checker (4.E). Stateless across calls except
/// for the HTTP client itself; the consecutive-failure counter lives in
/// `monitor`'s task, not on this struct, so one `HealthChecker` can be
/// shared by multiple concurrent `check`/`wait_for_healthy` callers safely.
pub struct HealthChecker {
    config: HealthCheckConfig,
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self { config, client }
    }

    /// `check(ctx) → err`. Success iff a 2xx response arrives within
    /// `timeout`.
    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    pub async fn check(&self) -> SupervisorResult<()> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .send()
            .await
            .map_err(|e| SupervisorError::Process(format!("health check request failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SupervisorError::Process(format!(
                "health check returned status {}",
                response.status()
            )))
        }
    }

    /// `monitor(ctx) → error channel`. Emits exactly one error when
    /// `failure_threshold` consecutive failures occur, then the sender task
    /// exits (closing the channel). Any success resets the counter to zero.
    /// The returned receiver is dropped (and polling stops) when `cancel` is
    /// triggered.
    #[instrument(skip(self, cancel))]
    pub fn monitor(self: std::sync::Arc<Self>, cancel: CancellationToken) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("health monitor cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(self.config.interval) => {}
                }

                match self.check().await {
                    Ok(()) => {
                        if consecutive_failures > 0 {
                            debug!("health recovered, resetting failure counter");
                        }
                        consecutive_failures = 0;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!(consecutive_failures, error = %e, "health check failed");
                        if consecutive_failures >= self.config.failure_threshold {
                            let _ = tx.send(e.to_string()).await;
                            return;
                        }
                    }
                }
            }
        });
        rx
    }

    /// `wait_for_healthy(ctx, overall_timeout) → err`. Polls every
    /// `interval`; returns as soon as one check succeeds, or `TIMEOUT` once
    /// `overall_timeout` elapses (4.G step 5: "30 s ceiling").
    #[instrument(skip(self))]
    pub async fn wait_for_healthy(&self, overall_timeout: Duration) -> SupervisorResult<()> {
        let deadline = tokio::time::Instant::now() + overall_timeout;
        loop {
            if self.check().await.is_ok() {
                return Ok(());
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(SupervisorError::HealthTimeout(overall_timeout));
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.config.interval.min(remaining)).await;
        }
    }
}

/// Minimal in-crate stand-in for `tokio_util::sync::CancellationToken` — the
/// workspace does not carry `tokio-util` as a dependency, and the supervisor
/// only needs the "signal everyone, check if signalled" shape, which a
/// `tokio::sync::watch<bool>` gives for free.
pub mod tokio_util_shim {
    use tokio::sync::watch;

    #[derive(Clone)]
    pub struct CancellationToken {
        tx: std::sync::Arc<watch::Sender<bool>>,
        rx: watch::Receiver<bool>,
    }

    impl CancellationToken {
        pub fn new() -> Self {
            let (tx, rx) = watch::channel(false);
            Self { tx: std::sync::Arc::new(tx), rx }
        }

        pub fn cancel(&self) {
            let _ = self.tx.send(true);
        }

        pub async fn cancelled(&self) {
            let mut rx = self.rx.clone();
            loop {
                if *rx.borrow() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    impl Default for CancellationToken {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(uri: &str) -> HealthCheckConfig {
        HealthCheckConfig {
            endpoint: format!("{uri}/health"),
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(200),
            failure_threshold: 3,
        }
    }

    #[tokio::test]
    async fn check_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let checker = HealthChecker::new(config_for(&server.uri()));
        assert!(checker.check().await.is_ok());
    }

    #[tokio::test]
    async fn check_fails_on_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let checker = HealthChecker::new(config_for(&server.uri()));
        assert!(checker.check().await.is_err());
    }

    #[tokio::test]
    async fn wait_for_healthy_times_out_when_never_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let checker = HealthChecker::new(config_for(&server.uri()));
        let result = checker.wait_for_healthy(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(SupervisorError::HealthTimeout(_))));
    }

    #[tokio::test]
    async fn wait_for_healthy_returns_on_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let checker = HealthChecker::new(config_for(&server.uri()));
        assert!(checker.wait_for_healthy(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn monitor_fires_once_after_threshold_consecutive_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = config_for(&server.uri());
        config.failure_threshold = 2;
        let checker = Arc::new(HealthChecker::new(config));
        let cancel = tokio_util_shim::CancellationToken::new();
        let mut rx = checker.monitor(cancel.clone());

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("monitor should fire within timeout")
            .expect("channel should yield one error message");
        assert!(msg.contains("503") || msg.contains("status"));

        // Channel closes after firing once.
        assert!(rx.recv().await.is_none());
        cancel.cancel();
    }
}
