//! Shared application state (§4.I).
//!
//! A small `Clone` struct wrapping `Arc`-shared collaborators, injected into
//! handlers via axum's `State` extractor.

use std::sync::Arc;

use supervisor_service::Supervisor;

use crate::auth::AuthConfig;
use crate::metrics::Metrics;
use crate::rate_limit::{RateLimitConfig, RateLimiter};

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Supervisor,
    pub auth: Arc<AuthConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
}

impl ApiState {
    pub fn new(supervisor: Supervisor, auth: AuthConfig, rate_limit: RateLimitConfig) -> Self {
        Self {
            supervisor,
            auth: Arc::new(auth),
            rate_limiter: Arc::new(RateLimiter::new(rate_limit)),
            metrics: Arc::new(Metrics::new()),
        }
    }
}
