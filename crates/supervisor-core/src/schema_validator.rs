//! Schema Validator (4.A).
//!
//! Two passes, split between structural and business-rule validation:
//!
//! 1. Structural: the raw document against a JSON Schema (`jsonschema`),
//!    catching wrong types, missing required fields and unknown-field typos
//!    before we even try to deserialize it into [`Config`].
//! 2. Semantic: the deserialized [`Config`] against field-level constraints
//!    (`validator`) — ranges, lengths, the license key's fixed width — that
//!    a JSON Schema expresses awkwardly.
//!
//! Both passes collect every failure rather than stopping at the first one,
//! since the API returns the full `FieldError` list in one response
//! (§6 `/v1/config/validate`).

use crate::error::{ConfigError, ConfigResult, FieldError};
use crate::model::user_config::{Config, ConfigFormat};
use jsonschema::JSONSchema;
use std::sync::OnceLock;
use validator::Validate;

/// Draft-07 JSON Schema for the top-level user configuration document.
/// Kept intentionally permissive on nested objects already covered by the
/// semantic pass; its job is to reject the wrong shape, not every business
/// rule.
const CONFIG_SCHEMA: &str = r#"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "type": "object",
    "required": ["service", "license_key"],
    "additionalProperties": true,
    "properties": {
        "service": {
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": { "type": "string", "minLength": 1 },
                "environment": { "type": ["string", "null"] },
                "version": { "type": ["string", "null"] },
                "tags": { "type": "object" }
            }
        },
        "license_key": { "type": "string" },
        "metrics": {
            "type": "object",
            "properties": {
                "enabled": { "type": "boolean" },
                "interval_secs": { "type": "integer", "minimum": 1 },
                "host_metrics": { "type": "boolean" },
                "process_metrics": { "type": "boolean" }
            }
        },
        "traces": {
            "type": "object",
            "properties": {
                "enabled": { "type": "boolean" },
                "sample_rate": { "type": "number", "minimum": 0, "maximum": 1 }
            }
        },
        "logs": { "type": "object" },
        "security": { "type": "object" },
        "processing": { "type": "object" },
        "export": { "type": "object" }
    }
}"#;

fn compiled_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema_doc: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).expect("embedded config schema is valid JSON");
        JSONSchema::options()
            .compile(&schema_doc)
            .expect("embedded config schema compiles")
    })
}

/// Parses `raw` in the given format into a generic JSON value, ready for
/// schema validation.
pub fn parse_document(raw: &str, format: ConfigFormat) -> ConfigResult<serde_json::Value> {
    match format {
        ConfigFormat::Json => serde_json::from_str(raw).map_err(|e| ConfigError::ParseFailed {
            format: "json".to_string(),
            message: e.to_string(),
        }),
        ConfigFormat::Yaml => serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseFailed {
            format: "yaml".to_string(),
            message: e.to_string(),
        }),
    }
}

fn validate_structure(document: &serde_json::Value) -> Vec<FieldError> {
    let schema = compiled_schema();
    match schema.validate(document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                FieldError::new(path, e.to_string(), "SCHEMA_VIOLATION")
            })
            .collect(),
    }
}

fn validate_semantics(config: &Config) -> Vec<FieldError> {
    match config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("invalid value for {field}"));
                    FieldError::new(format!("/{field}"), message, "FIELD_CONSTRAINT")
                })
            })
            .collect(),
    }
}

/// Runs both validation passes and returns either a fully-typed [`Config`]
/// or the complete list of field errors found.
pub fn validate(raw: &str, format: ConfigFormat) -> ConfigResult<Config> {
    let document = parse_document(raw, format)?;

    let mut errors = validate_structure(&document);
    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors));
    }

    let config: Config = serde_json::from_value(document).map_err(|e| ConfigError::ParseFailed {
        format: match format {
            ConfigFormat::Json => "json".to_string(),
            ConfigFormat::Yaml => "yaml".to_string(),
        },
        message: e.to_string(),
    })?;

    errors = validate_semantics(&config);
    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML: &str = r#"
service:
  name: checkout-service
license_key: "X"
metrics:
  enabled: true
  interval_secs: 30
  host_metrics: true
  process_metrics: false
"#;

    #[test]
    fn accepts_valid_document() {
        let config = validate(VALID_YAML, ConfigFormat::Yaml).expect("should validate");
        assert_eq!(config.service.name, "checkout-service");
        assert_eq!(config.metrics.interval_secs, 30);
    }

    #[test]
    fn rejects_missing_required_field() {
        let doc = "service:\n  name: x\n";
        let err = validate(doc, ConfigFormat::Yaml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
        assert!(!err.field_errors().is_empty());
    }

    #[test]
    fn rejects_empty_license_key() {
        let doc = "service:\n  name: x\nlicense_key: \"\"\n";
        let err = validate(doc, ConfigFormat::Yaml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
        assert!(err.field_errors().iter().any(|f| f.path == "/license_key"));
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        let doc = format!(
            "{VALID_YAML}traces:\n  enabled: true\n  sample_rate: 1.5\n"
        );
        let err = validate(&doc, ConfigFormat::Yaml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = validate("not: [valid", ConfigFormat::Yaml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }
}
