//! Ping Bot Example
//!
//! Registers a `Module:Ping` feature module that answers `ping` with `Pong`
//! on whichever platform the line came from.
//!
//! # Usage
//!
//! ```bash
//! # Terminal only
//! cargo run --package ping-bot -- --interactive
//!
//! # Networks from a config file
//! cargo run --package ping-bot -- --config tern.toml
//! ```

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use tern::adapters::terminal::TerminalConfig;
use tern::core::BusError;
use tern::prelude::*;
use tern::runtime::ConfigLoader;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(name = "ping-bot", about = "Answers ping with Pong")]
struct Args {
    /// Configuration file; searched for in the usual places when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read chat lines from the terminal.
    #[arg(short, long)]
    interactive: bool,
}

/// Replies `Pong` to `ping`.
#[derive(Default)]
struct PingModule {
    bus: OnceLock<Bus>,
}

impl PingModule {
    fn bus(&self) -> Result<&Bus> {
        self.bus.get().context("ping module is not registered")
    }

    fn is_ping(text: &str) -> bool {
        matches!(text.trim(), "ping" | "Ping")
    }
}

#[async_trait]
impl Module for PingModule {
    fn identifier(&self) -> ModuleIdentifier {
        ModuleIdentifier::new("Module", "Ping")
    }

    async fn on_register(&self, bus: Bus) {
        let _ = self.bus.set(bus);
    }

    async fn on_message(&self, message: &BusMessage) -> Result<()> {
        match message {
            BusMessage::IncomingChat(chat) if Self::is_ping(&chat.text.plain_text()) => {
                debug!(sender = %chat.sender, "Ping");
                // Runs on the dispatcher: waiting for queue room here would stall it.
                match self.bus()?.try_publish(chat.make_reply(PlainText::shared("Pong"))) {
                    Err(BusError::QueueFull) => {
                        warn!(sender = %chat.sender, "Bus queue full, dropping Pong");
                    }
                    result => result?,
                }
            }
            BusMessage::ModuleRegistered(ident) => {
                info!(module = %ident, "Module joined");
            }
            _ => {}
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    if args.interactive {
        config.terminal.get_or_insert_with(TerminalConfig::default).interactive = true;
    }

    let runtime = TernRuntime::from_config(&config);
    runtime.register_module(Arc::new(PingModule::default())).await?;
    runtime.run().await?;

    Ok(())
}
