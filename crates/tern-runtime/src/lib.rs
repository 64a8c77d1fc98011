//! Tern Runtime - orchestration layer for the Tern chat-bot framework.
//!
//! This crate provides:
//! - Configuration loading and validation ([`config`])
//! - Logging setup ([`logging`])
//! - Runtime orchestration ([`TernRuntime`]): bus lifecycle, platform
//!   start-up and signal handling
//!
//! ```ignore
//! use tern_runtime::TernRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Loads tern.toml, initializes logging
//!     let runtime = TernRuntime::new();
//!
//!     runtime.register_module(Arc::new(MyModule)).await?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, TernConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, TernRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for modules.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
