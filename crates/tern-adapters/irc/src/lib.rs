//! # Tern IRC Adapter
//!
//! Connects IRC networks to the Tern module bus. Each configured network
//! becomes an [`IrcPlatform`] module registered as `IRC:<sub_ident>`.
//!
//! ```rust,ignore
//! let platform = Arc::new(IrcPlatform::from_config(&network));
//! bus.register(platform.clone()).await?;
//! platform.connect().await?;
//! ```

mod config;
mod format;
mod platform;

pub use config::IrcNetworkConfig;
pub use format::strip_formatting;
pub use platform::{IRC_MAIN_IDENT, IrcPlatform};
