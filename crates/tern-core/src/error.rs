//! Error types for the module bus.

use thiserror::Error;

use crate::ident::ModuleIdentifier;

/// Errors returned by [`Bus`](crate::Bus) operations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The bus has been stopped and no longer accepts messages or modules.
    #[error("bus is stopped")]
    Stopped,

    /// The message queue is full (only returned by non-blocking publishing).
    #[error("bus queue is full")]
    QueueFull,

    /// The dispatcher has already been started.
    #[error("bus dispatcher is already running")]
    AlreadyRunning,

    /// A module tried to register under a wildcard identifier.
    #[error("'{0}' is a wildcard and cannot identify a module")]
    WildcardIdentity(ModuleIdentifier),
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;
