//! Shared application context.

use tokio_util::sync::CancellationToken;

use crate::bus::Bus;

/// State shared by the runtime and every platform it starts.
///
/// Cloning shares the same bus and shutdown signal.
#[derive(Debug, Clone)]
pub struct AppContext {
    bus: Bus,
    shutdown: CancellationToken,
}

impl AppContext {
    /// Creates a context around an existing bus.
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the module bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Returns the application-wide shutdown token.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Requests application shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await;
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new(Bus::new())
    }
}
