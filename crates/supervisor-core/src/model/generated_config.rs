//! The generated collector configuration (§3 "Generated Configuration").
//!
//! Built as a typed variant per receiver/processor/exporter kind instead of
//! an untyped map, then serialized through a single canonicalizing encoder
//! (`BTreeMap` keys sort themselves; `serde_yaml` renders the result with
//! stable 2-space indentation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Fixed processor ordering invariant (§3, §4.B, §8 "Processor ordering").
pub const PROCESSOR_ORDER: [&str; 6] = [
    "batch",
    "nrsecurity",
    "nrenrich",
    "nrtransform",
    "nrcap",
    "memory_limiter",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverConfig {
    HostMetrics {
        collection_interval: String,
        scrapers: Vec<String>,
        /// Filesystem scraper mount-point include-list.
        filesystem_mount_points: Vec<String>,
    },
    FileLog {
        include: Vec<String>,
        exclude: Vec<String>,
    },
    Otlp {
        grpc_endpoint: String,
        http_endpoint: String,
    },
    /// A per-service receiver produced when generating from discovery
    /// results (4.B "invoked from the auto-config path").
    Service {
        service_type: String,
        endpoint: String,
        protocol: String,
        /// Named environment-variable references, e.g. `${MYSQL_MONITOR_USER}`.
        username_var: Option<String>,
        password_var: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorConfig {
    Batch { timeout: String, send_batch_size: u32 },
    NrSecurity { redact_patterns: Vec<String> },
    NrEnrich {
        add_host_metadata: bool,
        add_cloud_metadata: bool,
        add_k8s_metadata: bool,
        custom_tags: HashMap<String, String>,
    },
    NrTransform {
        convert_units: bool,
        aggregations: Vec<String>,
        calculations: Vec<String>,
    },
    NrCap {
        global_limit: u64,
        per_metric: HashMap<String, u64>,
        limit_action: String,
    },
    MemoryLimiter { limit_mib: u64, spike_limit_mib: u64 },
}

impl ProcessorConfig {
    /// The processor-map key this variant is registered under; also its
    /// position in `PROCESSOR_ORDER`.
    pub fn key(&self) -> &'static str {
        match self {
            ProcessorConfig::Batch { .. } => "batch",
            ProcessorConfig::NrSecurity { .. } => "nrsecurity",
            ProcessorConfig::NrEnrich { .. } => "nrenrich",
            ProcessorConfig::NrTransform { .. } => "nrtransform",
            ProcessorConfig::NrCap { .. } => "nrcap",
            ProcessorConfig::MemoryLimiter { .. } => "memory_limiter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub enabled: bool,
    pub initial_interval: String,
    pub max_interval: String,
    pub max_elapsed_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendingQueueConfig {
    pub enabled: bool,
    pub num_consumers: u32,
    pub queue_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterConfig {
    Otlp {
        endpoint: String,
        /// Environment-variable reference for the API key header, e.g.
        /// `${NEW_RELIC_LICENSE_KEY}`.
        api_key_var: String,
        compression: String,
        retry: RetryConfig,
        sending_queue: SendingQueueConfig,
    },
}

/// A named (receivers, processors, exporters) triple (GLOSSARY "Pipeline").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Pipeline {
    pub receivers: Vec<String>,
    pub processors: Vec<String>,
    pub exporters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceSection {
    pub pipelines: BTreeMap<String, Pipeline>,
}

/// The full collector configuration tree plus generation metadata
/// (§3 "Generated Configuration").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedConfig {
    pub receivers: BTreeMap<String, ReceiverConfig>,
    pub processors: BTreeMap<String, ProcessorConfig>,
    pub exporters: BTreeMap<String, ExporterConfig>,
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
    pub service: ServiceSection,

    #[serde(skip)]
    pub hash: String,
    #[serde(skip)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub templates_used: Vec<String>,
    #[serde(skip)]
    pub metadata: HashMap<String, String>,
}

impl GeneratedConfig {
    /// Canonical YAML rendering: `BTreeMap` keys are already sorted, and
    /// `serde_yaml` emits stable 2-space-indented block style, so identical
    /// trees always serialize to identical bytes (§4.B "Determinism").
    pub fn to_canonical_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Returns the processor order actually present in a given pipeline,
    /// filtered to the fixed global order (§3, §8 "Processor ordering").
    pub fn processor_order_for(&self, pipeline: &Pipeline) -> Vec<String> {
        PROCESSOR_ORDER
            .iter()
            .filter(|key| pipeline.processors.iter().any(|p| p == *key))
            .map(|s| s.to_string())
            .collect()
    }
}
