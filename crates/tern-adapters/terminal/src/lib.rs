//! # Tern Terminal Adapter
//!
//! A console platform registered as `Terminal:<sub_ident>`. It logs every
//! bus message it sees, prints chat addressed to it and, in interactive
//! mode, turns each input line into an incoming chat with reply target
//! `console`.

mod config;
mod platform;

pub use config::TerminalConfig;
pub use platform::{CONSOLE_REPLY_TARGET, TERMINAL_MAIN_IDENT, TerminalPlatform};
