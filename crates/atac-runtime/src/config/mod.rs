//! Configuration loading and validation.
//!
//! [`AtacConfig`] carries logging, rate limits, tenants, per-plugin config and
//! webhook routes. [`ConfigLoader`] layers defaults, files and `ATAC_*`
//! environment variables with figment.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AtacConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
