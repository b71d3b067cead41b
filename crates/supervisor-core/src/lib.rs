//! Configuration data model, schema validation, and collector-config
//! generation for the host telemetry supervisor.
//!
//! This crate is deliberately synchronous and has no knowledge of the
//! collector process, HTTP, or signals — those live in `supervisor-service`
//! and `supervisor-api`. Keeping validation and generation pure makes the
//! hashing in [`model::generated_config::GeneratedConfig`] trustworthy and
//! the whole crate trivial to unit test.

pub mod error;
pub mod generator;
pub mod model;
pub mod schema_validator;

pub use error::{ConfigError, ConfigResult, FieldError};
pub use generator::{generate, generate_with_services};
pub use model::*;
pub use schema_validator::validate;
