//! Token-bucket rate limiting, keyed by client IP (§4.I "Rate limiting",
//! §5 "rate-limit-token acquisition is non-blocking").
//!
//! The bucket itself is hand-rolled; it sits behind the same
//! `async fn middleware(State, Request, Next) -> Result<Response, Response>`
//! shape `auth.rs` uses.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub burst: u32,
    pub refill_per_interval: u32,
    pub interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { burst: 60, refill_per_interval: 60, interval: Duration::from_secs(60) }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()) }
    }

    /// Non-blocking: an empty bucket is refused immediately rather than
    /// waited on (§5).
    async fn try_acquire(&self, ip: IpAddr) -> bool {
        let refill_rate = self.config.refill_per_interval as f64 / self.config.interval.as_secs_f64();
        let mut buckets = self.buckets.lock().await;
        let bucket =
            buckets.entry(ip).or_insert_with(|| Bucket { tokens: self.config.burst as f64, last_refill: Instant::now() });

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(self.config.burst as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn rate_limit(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if state.rate_limiter.try_acquire(addr.ip()).await {
        Ok(next.run(request).await)
    } else {
        state.metrics.rate_limited_total.inc();
        let mut response = ApiError::RateLimited.into_response();
        response.headers_mut().insert(axum::http::header::RETRY_AFTER, HeaderValue::from_static("60"));
        Err(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_exhausted_then_refused() {
        let limiter = RateLimiter::new(RateLimitConfig { burst: 2, refill_per_interval: 1, interval: Duration::from_secs(3600) });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.try_acquire(ip).await);
        assert!(limiter.try_acquire(ip).await);
        assert!(!limiter.try_acquire(ip).await);
    }

    #[tokio::test]
    async fn distinct_ips_get_independent_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig { burst: 1, refill_per_interval: 1, interval: Duration::from_secs(3600) });
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.try_acquire(a).await);
        assert!(limiter.try_acquire(b).await);
    }
}
