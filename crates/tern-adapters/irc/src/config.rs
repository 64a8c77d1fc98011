//! Configuration for one IRC network.
//!
//! ```toml
//! [[irc]]
//! sub_ident = "libera"
//! address = "irc.libera.chat:6697"
//! tls = true
//! nick = "tern"
//! auto_join = ["#tern"]
//!
//! [irc.rate_limit]
//! mode = "throttle"
//! ```

use serde::{Deserialize, Serialize};
use tern_irc::ClientConfig;

/// One IRC network the bot connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcNetworkConfig {
    /// Sub identifier of the platform module (`IRC:<sub_ident>`).
    pub sub_ident: String,

    /// Channels joined once registration completes.
    #[serde(default)]
    pub auto_join: Vec<String>,

    /// Session settings.
    #[serde(flatten)]
    pub client: ClientConfig,
}

impl IrcNetworkConfig {
    /// Creates a network entry without auto-joined channels.
    pub fn new(sub_ident: impl Into<String>, client: ClientConfig) -> Self {
        Self {
            sub_ident: sub_ident.into(),
            auto_join: Vec::new(),
            client,
        }
    }
}
