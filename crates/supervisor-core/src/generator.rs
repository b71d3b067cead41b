//! Config Generator (4.B): turns a validated [`Config`] into a
//! [`GeneratedConfig`] collector configuration tree.
//!
//! Generation is a pure function of its input — same `Config` in, byte-
//! identical `GeneratedConfig` out — which is what makes the SHA-256 hash in
//! §3 "Generated Configuration" meaningful as a change-detection key for the
//! Reload Engine (4.G).

use crate::error::{ConfigError, ConfigResult};
use crate::model::discovery::{DiscoveredService, ServiceType};
use crate::model::generated_config::{
    ExporterConfig, GeneratedConfig, Pipeline, ProcessorConfig, ReceiverConfig, RetryConfig,
    SendingQueueConfig, ServiceSection,
};
use crate::model::user_config::Config;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const TEMPLATE_HOST_METRICS: &str = "host_metrics_receiver.v1";
const TEMPLATE_FILELOG: &str = "filelog_receiver.v1";
const TEMPLATE_OTLP_PIPELINE: &str = "otlp_export_pipeline.v1";
const TEMPLATE_SERVICE_RECEIVERS: &str = "service_receivers.v1";

/// Environment-variable names the generated receiver for a discovered
/// service type references for its credentials (§6 "Per-service secrets...
/// referenced but not read by the core itself").
fn credential_vars(service_type: ServiceType) -> (Option<&'static str>, Option<&'static str>) {
    match service_type {
        ServiceType::Mysql => (Some("MYSQL_MONITOR_USER"), Some("MYSQL_MONITOR_PASS")),
        ServiceType::Postgresql => (Some("POSTGRES_MONITOR_USER"), Some("POSTGRES_MONITOR_PASS")),
        ServiceType::Mongodb => (Some("MONGODB_MONITOR_USER"), Some("MONGODB_MONITOR_PASS")),
        ServiceType::Redis => (None, Some("REDIS_PASSWORD")),
        ServiceType::Elasticsearch => (Some("ELASTICSEARCH_USER"), Some("ELASTICSEARCH_PASSWORD")),
        ServiceType::Rabbitmq => (Some("RABBITMQ_USER"), Some("RABBITMQ_PASS")),
        _ => (None, None),
    }
}

/// Builds the full [`GeneratedConfig`] for a validated [`Config`], with no
/// discovered services layered in (the plain §4.B path from a user-supplied
/// or remote config).
pub fn generate(config: &Config) -> ConfigResult<GeneratedConfig> {
    generate_with_services(config, &[])
}

/// Builds the full [`GeneratedConfig`], additionally generating one receiver
/// per discovered service and wiring it into the metrics pipeline (4.B
/// "When invoked from the auto-config path, include per-service receivers
/// keyed by discovered service type").
pub fn generate_with_services(
    config: &Config,
    services: &[DiscoveredService],
) -> ConfigResult<GeneratedConfig> {
    if !config.metrics.enabled && !config.traces.enabled && !config.logs.enabled {
        return Err(ConfigError::GenerationFailed(
            "at least one of metrics, traces or logs must be enabled".to_string(),
        ));
    }

    let mut receivers = BTreeMap::new();
    let mut processors = BTreeMap::new();
    let mut exporters = BTreeMap::new();
    let mut templates_used = Vec::new();

    if config.metrics.enabled {
        // Fixed scraper set regardless of the host_metrics/process_metrics
        // toggles; those toggles gate whether this receiver is generated at
        // all, not which scrapers it runs.
        let mut scrapers: Vec<String> = ["cpu", "memory", "disk", "filesystem", "network", "load"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if config.metrics.process_metrics {
            scrapers.push("processes".to_string());
        }
        receivers.insert(
            "hostmetrics".to_string(),
            ReceiverConfig::HostMetrics {
                collection_interval: format!("{}s", config.metrics.interval_secs),
                scrapers,
                filesystem_mount_points: vec!["/".to_string(), "/var".to_string(), "/tmp".to_string()],
            },
        );
        templates_used.push(TEMPLATE_HOST_METRICS.to_string());
    }

    if config.logs.enabled {
        receivers.insert(
            "filelog/system".to_string(),
            ReceiverConfig::FileLog {
                include: vec![
                    "/var/log/syslog".to_string(),
                    "/var/log/messages".to_string(),
                ],
                exclude: vec!["*.gz".to_string()],
            },
        );
        templates_used.push(TEMPLATE_FILELOG.to_string());
    }

    if config.traces.enabled {
        receivers.insert(
            "otlp".to_string(),
            ReceiverConfig::Otlp {
                grpc_endpoint: "0.0.0.0:4317".to_string(),
                http_endpoint: "0.0.0.0:4318".to_string(),
            },
        );
    }

    let mut service_receiver_keys = Vec::new();
    if config.metrics.enabled {
        for (idx, discovered) in services.iter().enumerate() {
            let Some(endpoint) = discovered.endpoints.first() else {
                continue;
            };
            let key = format!("{}/{}", discovered.service_type.as_str(), idx);
            let (username_var, password_var) = credential_vars(discovered.service_type);
            receivers.insert(
                key.clone(),
                ReceiverConfig::Service {
                    service_type: discovered.service_type.as_str().to_string(),
                    endpoint: format!("{}:{}", endpoint.address, endpoint.port),
                    protocol: endpoint.protocol.clone(),
                    username_var: username_var.map(|v| format!("${{{v}}}")),
                    password_var: password_var.map(|v| format!("${{{v}}}")),
                },
            );
            service_receiver_keys.push(key);
        }
        if !services.is_empty() {
            templates_used.push(TEMPLATE_SERVICE_RECEIVERS.to_string());
        }
    }

    if receivers.is_empty() {
        return Err(ConfigError::GenerationFailed(
            "no receivers would be generated from this configuration".to_string(),
        ));
    }

    // Processors, in the fixed ordering the generated pipeline will later
    // project onto (batch, nrsecurity, nrenrich, nrtransform, nrcap,
    // memory_limiter).
    processors.insert(
        "batch".to_string(),
        ProcessorConfig::Batch {
            timeout: "5s".to_string(),
            send_batch_size: 1000,
        },
    );

    if config.security.redact_secrets {
        processors.insert(
            "nrsecurity".to_string(),
            ProcessorConfig::NrSecurity {
                redact_patterns: config.security.redact_patterns.clone(),
            },
        );
    }

    if config.processing.enrich.any_enabled() {
        processors.insert(
            "nrenrich".to_string(),
            ProcessorConfig::NrEnrich {
                add_host_metadata: config.processing.enrich.add_host_metadata,
                add_cloud_metadata: config.processing.enrich.add_cloud_metadata,
                add_k8s_metadata: config.processing.enrich.add_k8s_metadata,
                custom_tags: config.processing.enrich.custom_tags.clone(),
            },
        );
    }

    if config.processing.transform.any_enabled() {
        processors.insert(
            "nrtransform".to_string(),
            ProcessorConfig::NrTransform {
                convert_units: config.processing.transform.convert_units,
                aggregations: config.processing.transform.aggregations.clone(),
                calculations: config.processing.transform.calculations.clone(),
            },
        );
    }

    if config.processing.cardinality.enabled {
        processors.insert(
            "nrcap".to_string(),
            ProcessorConfig::NrCap {
                global_limit: config.processing.cardinality.global_limit,
                per_metric: config.processing.cardinality.per_metric.clone(),
                limit_action: match config.processing.cardinality.limit_action {
                    crate::model::user_config::CardinalityLimitAction::Drop => "drop".to_string(),
                    crate::model::user_config::CardinalityLimitAction::Aggregate => {
                        "aggregate".to_string()
                    }
                },
            },
        );
    }

    processors.insert(
        "memory_limiter".to_string(),
        ProcessorConfig::MemoryLimiter {
            limit_mib: 512,
            spike_limit_mib: 128,
        },
    );

    exporters.insert(
        "otlp/newrelic".to_string(),
        ExporterConfig::Otlp {
            endpoint: "otlp.nr-data.net:4317".to_string(),
            api_key_var: "${NEW_RELIC_LICENSE_KEY}".to_string(),
            compression: "gzip".to_string(),
            retry: RetryConfig {
                enabled: true,
                initial_interval: "5s".to_string(),
                max_interval: "30s".to_string(),
                max_elapsed_time: "300s".to_string(),
            },
            sending_queue: SendingQueueConfig {
                enabled: true,
                num_consumers: 4,
                queue_size: 1000,
            },
        },
    );
    templates_used.push(TEMPLATE_OTLP_PIPELINE.to_string());

    let processor_keys: Vec<String> = crate::model::generated_config::PROCESSOR_ORDER
        .iter()
        .filter(|k| processors.contains_key(**k))
        .map(|s| s.to_string())
        .collect();

    let mut pipelines = BTreeMap::new();
    if config.metrics.enabled {
        let mut metrics_receivers = vec!["hostmetrics".to_string()];
        metrics_receivers.extend(service_receiver_keys);
        pipelines.insert(
            "metrics".to_string(),
            Pipeline {
                receivers: metrics_receivers,
                processors: processor_keys.clone(),
                exporters: vec!["otlp/newrelic".to_string()],
            },
        );
    }
    if config.traces.enabled {
        pipelines.insert(
            "traces".to_string(),
            Pipeline {
                receivers: vec!["otlp".to_string()],
                processors: processor_keys.clone(),
                exporters: vec!["otlp/newrelic".to_string()],
            },
        );
    }
    if config.logs.enabled && receivers.contains_key("filelog/system") {
        pipelines.insert(
            "logs".to_string(),
            Pipeline {
                receivers: vec!["filelog/system".to_string()],
                processors: processor_keys.clone(),
                exporters: vec!["otlp/newrelic".to_string()],
            },
        );
    }

    validate_pipeline_receivers(&pipelines, &receivers)?;

    let mut generated = GeneratedConfig {
        receivers,
        processors,
        exporters,
        extensions: BTreeMap::new(),
        service: ServiceSection { pipelines },
        hash: String::new(),
        generated_at: Some(Utc::now()),
        templates_used,
        metadata: Default::default(),
    };

    generated.hash = canonical_hash(&generated)?;
    Ok(generated)
}

/// §3 "every receiver referenced in a pipeline exists in the receivers
/// mapping" invariant.
fn validate_pipeline_receivers(
    pipelines: &BTreeMap<String, Pipeline>,
    receivers: &BTreeMap<String, ReceiverConfig>,
) -> ConfigResult<()> {
    for (name, pipeline) in pipelines {
        for receiver in &pipeline.receivers {
            if !receivers.contains_key(receiver) {
                return Err(ConfigError::GenerationFailed(format!(
                    "pipeline {name} references unknown receiver {receiver}"
                )));
            }
        }
    }
    Ok(())
}

/// SHA-256 hash of the canonical YAML rendering, hex-encoded.
fn canonical_hash(generated: &GeneratedConfig) -> ConfigResult<String> {
    let canonical = generated
        .to_canonical_yaml()
        .map_err(|e| ConfigError::GenerationFailed(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::user_config::{Config, LogsConfig, ServiceConfig};

    fn base_config() -> Config {
        Config {
            service: ServiceConfig {
                name: "svc".to_string(),
                environment: None,
                version: None,
                tags: Default::default(),
            },
            license_key: "X".to_string(),
            metrics: Default::default(),
            traces: Default::default(),
            logs: LogsConfig::default(),
            security: Default::default(),
            processing: Default::default(),
            export: Default::default(),
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let config = base_config();
        let a = generate(&config).unwrap();
        let b = generate(&config).unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn processor_order_matches_fixed_sequence() {
        let mut config = base_config();
        config.processing.cardinality.enabled = true;
        let generated = generate(&config).unwrap();
        let pipeline = &generated.service.pipelines["metrics"];
        assert_eq!(
            pipeline.processors,
            vec!["batch", "nrsecurity", "nrenrich", "nrtransform", "nrcap", "memory_limiter"]
        );
    }

    #[test]
    fn rejects_config_with_everything_disabled() {
        let mut config = base_config();
        config.metrics.enabled = false;
        let err = generate(&config).unwrap_err();
        assert_eq!(err.code(), "GENERATION_FAILED");
    }

    #[test]
    fn discovered_services_become_metrics_pipeline_receivers() {
        use crate::model::discovery::{Confidence, DiscoveredService, DiscoveryMethod, ServiceEndpoint, ServiceType};

        let config = base_config();
        let services = vec![DiscoveredService {
            service_type: ServiceType::Mysql,
            version: None,
            endpoints: vec![ServiceEndpoint { address: "127.0.0.1".to_string(), port: 3306, protocol: "tcp".to_string() }],
            discovered_by: vec![DiscoveryMethod::Port],
            confidence: Confidence::High,
            process_info: None,
            config_paths: Vec::new(),
            package_info: None,
        }];
        let generated = generate_with_services(&config, &services).unwrap();
        assert!(generated.receivers.contains_key("mysql/0"));
        assert!(generated.service.pipelines["metrics"].receivers.contains(&"mysql/0".to_string()));
        match &generated.receivers["mysql/0"] {
            ReceiverConfig::Service { username_var, .. } => {
                assert_eq!(username_var.as_deref(), Some("${MYSQL_MONITOR_USER}"));
            }
            other => panic!("expected a service receiver, got {other:?}"),
        }
    }
}
