pub mod discovery;
pub mod event;
pub mod generated_config;
pub mod remote_config;
pub mod status;
pub mod user_config;
pub mod version;

pub use discovery::{Confidence, DiscoveredService, DiscoveryMethod, ServiceEndpoint, ServiceType};
pub use event::{Event, EventLog, EventRecord};
pub use generated_config::{
    ExporterConfig, GeneratedConfig, Pipeline, ProcessorConfig, ReceiverConfig, ServiceSection,
    PROCESSOR_ORDER,
};
pub use remote_config::{IntegrationConfig, RemoteConfig, RemoteConfigOutcome, SignedPayload};
pub use status::{CollectorState, CollectorStatus, HealthState, HealthStatus};
pub use user_config::{
    CardinalityConfig, CardinalityLimitAction, Config, ConfigFormat, EnrichConfig, ExportConfig,
    LogsConfig, MetricsConfig, ProcessingConfig, SecurityConfig, ServiceConfig, TracesConfig,
    TransformConfig,
};
pub use version::{ConfigVersion, NewVersion, VersionHistory};
