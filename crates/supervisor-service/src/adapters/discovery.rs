//! Discovery Client (4.J) — interface only. The supervisor treats the actual
//! probing of `/proc` and package databases as an external collaborator;
//! this module only defines the contract the auto-config orchestrator (4.L)
//! drives, plus a deterministic in-memory provider useful for tests and for
//! hosts with a static, operator-supplied service list.
//!
//! A small `#[async_trait]` interface plus a concrete struct implementing
//! it, the usual shape for an adapter with one production implementation
//! and one test/fixture implementation.

use async_trait::async_trait;
use supervisor_core::DiscoveredService;

use crate::error::SupervisorResult;

/// `discover(ctx) → [DiscoveredService]` (4.J). Implementations must return a
/// finite list, ordered deterministically by `(service_type, first
/// endpoint)`, and must be idempotent across calls against identical host
/// state — the auto-config loop diffs two calls' output to decide whether
/// anything changed.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    async fn discover(&self) -> SupervisorResult<Vec<DiscoveredService>>;
}

/// A fixed, operator-supplied list of services — useful where host probing
/// is performed by an external agent and handed to the supervisor as
/// configuration, and as the default test double for 4.L.
pub struct StaticDiscoveryProvider {
    services: Vec<DiscoveredService>,
}

impl StaticDiscoveryProvider {
    pub fn new(mut services: Vec<DiscoveredService>) -> Self {
        sort_deterministically(&mut services);
        Self { services }
    }
}

#[async_trait]
impl DiscoveryProvider for StaticDiscoveryProvider {
    async fn discover(&self) -> SupervisorResult<Vec<DiscoveredService>> {
        Ok(self.services.clone())
    }
}

/// Deterministic ordering by `(type, first endpoint)` (4.J).
fn sort_deterministically(services: &mut [DiscoveredService]) {
    services.sort_by(|a, b| a.service_type.cmp(&b.service_type).then_with(|| a.primary_endpoint().cmp(&b.primary_endpoint())));
}

/// `(type, endpoints)` tuple set used by the auto-config loop's change
/// detection (4.L step 2: "equal when the multiset of `(type, endpoints)`
/// tuples matches").
pub fn fingerprint(services: &[DiscoveredService]) -> Vec<(&'static str, Option<String>)> {
    let mut pairs: Vec<(&'static str, Option<String>)> =
        services.iter().map(|s| (s.service_type.as_str(), s.primary_endpoint())).collect();
    pairs.sort();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor_core::{Confidence, DiscoveryMethod, ServiceEndpoint, ServiceType};

    fn service(service_type: ServiceType, address: &str, port: u16) -> DiscoveredService {
        DiscoveredService {
            service_type,
            version: None,
            endpoints: vec![ServiceEndpoint { address: address.to_string(), port, protocol: "tcp".to_string() }],
            discovered_by: vec![DiscoveryMethod::Port],
            confidence: Confidence::Medium,
            process_info: None,
            config_paths: Vec::new(),
            package_info: None,
        }
    }

    #[tokio::test]
    async fn static_provider_orders_deterministically() {
        let provider = StaticDiscoveryProvider::new(vec![
            service(ServiceType::Redis, "127.0.0.1", 6379),
            service(ServiceType::Mysql, "127.0.0.1", 3306),
            service(ServiceType::Mysql, "127.0.0.1", 3307),
        ]);
        let services = provider.discover().await.unwrap();
        let types: Vec<&str> = services.iter().map(|s| s.service_type.as_str()).collect();
        assert_eq!(types, vec!["mysql", "mysql", "redis"]);
        assert_eq!(services[0].primary_endpoint().as_deref(), Some("127.0.0.1:3306"));
    }

    #[tokio::test]
    async fn static_provider_is_idempotent() {
        let provider = StaticDiscoveryProvider::new(vec![service(ServiceType::Nginx, "127.0.0.1", 80)]);
        let first = provider.discover().await.unwrap();
        let second = provider.discover().await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fingerprint_ignores_order() {
        let a = vec![service(ServiceType::Mysql, "10.0.0.1", 3306), service(ServiceType::Redis, "10.0.0.2", 6379)];
        let b = vec![service(ServiceType::Redis, "10.0.0.2", 6379), service(ServiceType::Mysql, "10.0.0.1", 3306)];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_detects_endpoint_change() {
        let a = vec![service(ServiceType::Mysql, "10.0.0.1", 3306)];
        let b = vec![service(ServiceType::Mysql, "10.0.0.1", 3307)];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
