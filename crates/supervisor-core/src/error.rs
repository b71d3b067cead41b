//! Error types for the configuration pipeline (schema validation + generation).
//!
//! Every variant maps to one of the error codes enumerated in the
//! control-plane API's error envelope (`CONFIG_INVALID`, `GENERATION_FAILED`,
//! `CONFIG_MISSING`, `RESOURCE_NOT_FOUND`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    /// JSON-pointer-style path to the offending field, e.g. `/service/name`.
    pub path: String,
    pub message: String,
    pub code: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Errors produced by the configuration pipeline (4.A Schema Validator,
/// 4.B Config Generator, 4.C Config Engine).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration is invalid")]
    Invalid(Vec<FieldError>),

    #[error("configuration could not be parsed as {format}: {message}")]
    ParseFailed { format: String, message: String },

    #[error("configuration generation failed: {0}")]
    GenerationFailed(String),

    #[error("no configuration has been loaded")]
    Missing,

    #[error("requested resource not found: {0}")]
    NotFound(String),
}

impl ConfigError {
    /// Stable error code surfaced in the API error envelope (§6/§7).
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "CONFIG_INVALID",
            ConfigError::ParseFailed { .. } => "CONFIG_INVALID",
            ConfigError::GenerationFailed(_) => "GENERATION_FAILED",
            ConfigError::Missing => "CONFIG_MISSING",
            ConfigError::NotFound(_) => "RESOURCE_NOT_FOUND",
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ConfigError::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
