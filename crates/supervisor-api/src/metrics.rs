//! Prometheus metrics (`GET /metrics`, §4.I).
//!
//! Uses the `prometheus` crate, with a dedicated `Registry` and the metric
//! set registered at construction time.

use prometheus::{Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    /// Cumulative restart count, read wholesale off [`supervisor_core::CollectorStatus`]
    /// on every scrape rather than incremented event-by-event, so a `Gauge`
    /// (absolute `.set()`) is the right primitive despite the `_total` name
    /// Prometheus convention expects of a monotonic count.
    pub collector_restart_count_total: Gauge,
    pub collector_uptime_seconds: Gauge,
    pub collector_memory_bytes: Gauge,
    pub health_check_failures_total: Counter,
    pub reload_total: CounterVec,
    pub reload_duration_seconds: HistogramVec,
    pub config_version: Gauge,
    pub api_requests_total: CounterVec,
    pub rate_limited_total: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let collector_restart_count_total =
            Gauge::with_opts(Opts::new("supervisor_collector_restart_count_total", "Total collector restarts"))
                .expect("fixed, valid metric name");
        registry.register(Box::new(collector_restart_count_total.clone())).expect("unique metric name");

        let collector_uptime_seconds = Gauge::with_opts(Opts::new(
            "supervisor_collector_uptime_seconds",
            "Seconds since the current collector process started",
        ))
        .expect("fixed, valid metric name");
        registry.register(Box::new(collector_uptime_seconds.clone())).expect("unique metric name");

        let collector_memory_bytes = Gauge::with_opts(Opts::new(
            "supervisor_collector_memory_bytes",
            "Resident set size of the current collector process, in bytes",
        ))
        .expect("fixed, valid metric name");
        registry.register(Box::new(collector_memory_bytes.clone())).expect("unique metric name");

        let health_check_failures_total =
            Counter::with_opts(Opts::new("supervisor_health_check_failures_total", "Total health check failures"))
                .expect("fixed, valid metric name");
        registry.register(Box::new(health_check_failures_total.clone())).expect("unique metric name");

        let reload_total =
            CounterVec::new(Opts::new("supervisor_reload_total", "Total reloads attempted"), &["strategy", "result"])
                .expect("fixed, valid metric name");
        registry.register(Box::new(reload_total.clone())).expect("unique metric name");

        let reload_duration_seconds = HistogramVec::new(
            HistogramOpts::new("supervisor_reload_duration_seconds", "Reload duration in seconds"),
            &["strategy"],
        )
        .expect("fixed, valid metric name");
        registry.register(Box::new(reload_duration_seconds.clone())).expect("unique metric name");

        let config_version =
            Gauge::with_opts(Opts::new("supervisor_config_version", "Currently active configuration version"))
                .expect("fixed, valid metric name");
        registry.register(Box::new(config_version.clone())).expect("unique metric name");

        let api_requests_total = CounterVec::new(
            Opts::new("supervisor_api_requests_total", "Total API requests"),
            &["method", "path", "status"],
        )
        .expect("fixed, valid metric name");
        registry.register(Box::new(api_requests_total.clone())).expect("unique metric name");

        let rate_limited_total =
            Counter::with_opts(Opts::new("supervisor_rate_limited_total", "Total requests rejected by the rate limiter"))
                .expect("fixed, valid metric name");
        registry.register(Box::new(rate_limited_total.clone())).expect("unique metric name");

        Self {
            registry,
            collector_restart_count_total,
            collector_uptime_seconds,
            collector_memory_bytes,
            health_check_failures_total,
            reload_total,
            reload_duration_seconds,
            config_version,
            api_requests_total,
            rate_limited_total,
        }
    }

    /// Renders every registered metric family in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        let families = self.registry.gather();
        encoder.encode(&families, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_registered_family() {
        let metrics = Metrics::new();
        metrics.collector_restart_count_total.set(1.0);
        let rendered = metrics.render();
        assert!(rendered.contains("supervisor_collector_restart_count_total"));
        assert!(rendered.contains("supervisor_api_requests_total"));
    }
}
