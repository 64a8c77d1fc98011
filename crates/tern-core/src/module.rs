//! The module contract.
//!
//! Platform adapters (IRC, terminal, ...) and feature modules implement
//! [`Module`] and are owned by the [`Bus`](crate::Bus) between
//! registration and unregistration.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::Bus;
use crate::ident::ModuleIdentifier;
use crate::message::BusMessage;

/// A participant on the module bus.
///
/// # Example
///
/// ```rust,ignore
/// struct Logger;
///
/// #[async_trait]
/// impl Module for Logger {
///     fn identifier(&self) -> ModuleIdentifier {
///         ModuleIdentifier::new("Module", "Logger")
///     }
///
///     async fn on_message(&self, message: &BusMessage) -> anyhow::Result<()> {
///         tracing::info!(kind = message.kind(), "bus message");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Module: Send + Sync {
    /// Returns the identity this module registers under.
    fn identifier(&self) -> ModuleIdentifier;

    /// Called once the module is stored in the registry.
    ///
    /// The registry write lock is held during this call: the hook must not
    /// register or unregister modules itself.
    async fn on_register(&self, _bus: Bus) {}

    /// Called before the module is removed from the registry.
    async fn on_unregister(&self) {}

    /// Handles a message routed to this module.
    ///
    /// Errors and panics are caught by the bus and logged with this
    /// module's identifier; they never affect delivery to other modules.
    async fn on_message(&self, message: &BusMessage) -> anyhow::Result<()>;
}

/// A shared module trait object.
pub type BoxedModule = Arc<dyn Module>;
