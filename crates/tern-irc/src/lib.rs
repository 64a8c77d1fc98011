//! # Tern IRC
//!
//! IRC protocol support for the Tern chat-bot framework.
//!
//! The crate is layered bottom-up:
//!
//! | Layer | Type | Role |
//! |-------|------|------|
//! | wire | [`Message`], [`Source`] | message model and serialization |
//! | parser | [`Parser`] | streaming CRLF line decoder |
//! | transport | [`Connection`] | TCP/TLS socket with reader and rate-limited writer tasks |
//! | session | [`Client`] | registration, capabilities, keepalive, mode tracking |
//!
//! ```rust,ignore
//! let client = Client::new(ClientConfig::new("irc.libera.chat:6697", "tern").with_tls(true));
//! client.set_post_init_callback(|| async { tracing::info!("registered") });
//! client.set_message_handler(|message| async move { tracing::debug!(%message) });
//! client.connect().await?;
//! client.wait().await;
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod mode;
pub mod parser;
mod tls;
pub mod wire;

pub use client::{
    Client, ClientInformation, ClientState, MessageCallback, PostInitCallback, ServerInformation,
};
pub use config::ClientConfig;
pub use connection::{Connection, InboundHandler, rate_key};
pub use error::{IrcError, IrcResult};
pub use mode::ModeStore;
pub use parser::{MAX_LINE_LENGTH, Parser, parse_line};
pub use wire::{Message, Source, Tags};

pub use tern_ratelimit::{EnforcementMode, RateLimitConfig};
