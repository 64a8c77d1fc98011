//! Configuration module for the Tern runtime.
//!
//! TOML files, `TERN_*` environment variables and programmatic defaults
//! are layered with figment into a [`TernConfig`], then validated.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    BusConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig, TernConfig,
};
pub use validation::validate_config;
