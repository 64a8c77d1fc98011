//! # Tern
//!
//! A modular chat-bot framework built around a message bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐                ┌─────┐               ┌──────────────┐
//! │ IRC:libera    │◀──────────────▶│     │◀─────────────▶│ Module:Ping  │
//! ├───────────────┤  BusMessage    │ Bus │  BusMessage   ├──────────────┤
//! │ Terminal:std  │◀──────────────▶│     │◀─────────────▶│ Module:...   │
//! └───────────────┘                └─────┘               └──────────────┘
//!    platforms                                              features
//! ```
//!
//! - **Core** ([`core`]): identifiers, messages, the module contract and the bus
//! - **IRC** ([`irc`]): wire parser, TLS connection, protocol client
//! - **Rate limiting** ([`ratelimit`]): token buckets with an LRU of per-target buckets
//! - **Adapters** ([`adapters`]): IRC and terminal platform modules
//! - **Runtime** ([`runtime`]): configuration, logging, start-up and shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tern::prelude::*;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl Module for Ping {
//!     fn identifier(&self) -> ModuleIdentifier {
//!         ModuleIdentifier::new("Module", "Ping")
//!     }
//!
//!     async fn on_message(&self, message: &BusMessage) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TernRuntime::new();
//!     runtime.register_module(std::sync::Arc::new(Ping)).await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `tern.toml` configuration files
//! - `json-log`: JSON log output

pub use tern_core as core;
pub use tern_irc as irc;
pub use tern_ratelimit as ratelimit;
pub use tern_runtime as runtime;

/// Platform adapters.
pub mod adapters {
    pub use tern_adapter_irc as irc;
    pub use tern_adapter_terminal as terminal;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tern_core::prelude::*;
    pub use tern_runtime::{TernConfig, TernRuntime};
}
