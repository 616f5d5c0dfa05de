//! Configuration module for the Ferd runtime.
//!
//! This module provides layered configuration loading (files, environment,
//! programmatic overrides) and validation for logging and session settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    FerdConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SessionConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
