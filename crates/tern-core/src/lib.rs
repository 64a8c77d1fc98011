//! # Tern Core
//!
//! The module bus at the heart of the Tern chat-bot framework.
//!
//! Everything in a Tern bot is a [`Module`]: platform adapters that speak
//! IRC or read the terminal, and feature modules that answer commands.
//! Modules never call each other directly. They publish [`BusMessage`]s
//! onto the [`Bus`], which routes each one by [`ModuleIdentifier`]:
//!
//! ```text
//! ┌──────────────┐  IncomingChat   ┌─────┐  broadcast   ┌─────────────┐
//! │ IRC:libera   │────────────────▶│     │─────────────▶│ Module:Ping │
//! └──────────────┘                 │ Bus │              └─────────────┘
//!        ▲          OutgoingChat   │     │   publish           │
//!        └─────────────────────────│     │◀────────────────────┘
//!                  (targeted)      └─────┘
//! ```
//!
//! - **Identifiers** ([`ident`]): `main:sub` pairs with `*` as a family wildcard.
//! - **Messages** ([`message`]): incoming/outgoing chat, control commands,
//!   registration announcements.
//! - **Payloads** ([`payload`]): the opaque chat text contract.
//! - **Bus** ([`bus`]): registry, bounded queue, fault-isolated dispatch.

pub mod bus;
pub mod context;
pub mod error;
pub mod ident;
pub mod message;
pub mod module;
pub mod payload;

pub use bus::{Bus, DEFAULT_QUEUE_CAPACITY};
pub use context::AppContext;
pub use error::{BusError, BusResult};
pub use ident::{IdentParseError, ModuleIdentifier, RouteMatch, WILDCARD};
pub use message::{BusMessage, ControlData, IncomingChat, ModuleControl, OutgoingChat};
pub use module::{BoxedModule, Module};
pub use payload::{ChatPayload, ChatText, FromIntermediate, PayloadError, PlainText};

/// Re-exported so modules can implement [`Module`] without a direct dependency.
pub use async_trait::async_trait;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        AppContext, BoxedModule, Bus, BusMessage, ChatPayload, ChatText, IncomingChat, Module,
        ModuleControl, ModuleIdentifier, OutgoingChat, PlainText, async_trait,
    };
}
