//! Discovered service types (§3 "Discovered Service", 4.J Discovery Client).

use serde::{Deserialize, Serialize};

/// The closed set of service types a discovery backend may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Mysql,
    Postgresql,
    Redis,
    Nginx,
    Apache,
    Mongodb,
    Elasticsearch,
    Rabbitmq,
    Memcached,
    Kafka,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Mysql => "mysql",
            ServiceType::Postgresql => "postgresql",
            ServiceType::Redis => "redis",
            ServiceType::Nginx => "nginx",
            ServiceType::Apache => "apache",
            ServiceType::Mongodb => "mongodb",
            ServiceType::Elasticsearch => "elasticsearch",
            ServiceType::Rabbitmq => "rabbitmq",
            ServiceType::Memcached => "memcached",
            ServiceType::Kafka => "kafka",
        }
    }
}

/// How a discovery backend found the service (§3 "discovered_by").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Process,
    Port,
    ConfigFile,
    Package,
}

/// A network endpoint the service was observed listening on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub address: String,
    pub port: u16,
    pub protocol: String,
}

/// Discovery confidence (§3 "confidence ∈ {HIGH|MEDIUM|LOW}"). The
/// auto-config orchestrator ignores anything below its configured
/// threshold (4.L).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A candidate monitored service surfaced by a discovery backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredService {
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub endpoints: Vec<ServiceEndpoint>,
    pub discovered_by: Vec<DiscoveryMethod>,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_info: Option<String>,
}

impl DiscoveredService {
    /// The address:port of the first reported endpoint, used wherever a
    /// single-endpoint summary is needed (receiver generation, logging).
    pub fn primary_endpoint(&self) -> Option<String> {
        self.endpoints.first().map(|e| format!("{}:{}", e.address, e.port))
    }
}
