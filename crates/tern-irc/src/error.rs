//! Error types for the IRC layer.

use std::io;

use thiserror::Error;

/// Errors raised by [`Connection`](crate::Connection) and [`Client`](crate::Client).
#[derive(Debug, Error)]
pub enum IrcError {
    /// The TCP connection could not be established.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Address that was dialled.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The TLS handshake failed.
    #[error("TLS handshake with {address} failed: {source}")]
    Tls {
        /// Address of the peer.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The host part of the address is not a valid TLS server name.
    #[error("invalid TLS server name '{0}'")]
    InvalidServerName(String),

    /// The configuration was rejected.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// `connect` was called on a live or previously used connection.
    #[error("connection has already been started")]
    AlreadyConnected,

    /// The connection is closed.
    #[error("connection is closed")]
    Closed,

    /// The outgoing queue is full (non-blocking sends only).
    #[error("outgoing queue is full")]
    QueueFull,
}

/// Result type for IRC operations.
pub type IrcResult<T> = Result<T, IrcError>;
