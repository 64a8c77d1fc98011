//! Terminal platform configuration.

use serde::{Deserialize, Serialize};

/// Settings for the terminal platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Sub identifier of the platform module.
    #[serde(default = "default_sub_ident")]
    pub sub_ident: String,

    /// Read chat lines from standard input.
    #[serde(default)]
    pub interactive: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            sub_ident: default_sub_ident(),
            interactive: false,
        }
    }
}

fn default_sub_ident() -> String {
    "std".to_string()
}
