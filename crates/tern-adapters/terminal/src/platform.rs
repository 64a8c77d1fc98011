//! The terminal platform module.

use async_trait::async_trait;
use parking_lot::Mutex;
use tern_core::{
    Bus, BusMessage, IncomingChat, Module, ModuleIdentifier, OutgoingChat, PlainText,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TerminalConfig;

/// Main identifier of terminal platform modules.
pub const TERMINAL_MAIN_IDENT: &str = "Terminal";

/// Reply target of chat typed at the console.
pub const CONSOLE_REPLY_TARGET: &str = "console";

type Input = Box<dyn AsyncRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Console platform.
pub struct TerminalPlatform {
    ident: ModuleIdentifier,
    input: Mutex<Option<Input>>,
    output: tokio::sync::Mutex<Output>,
    reader: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl TerminalPlatform {
    /// Creates a platform writing to stdout and, when `interactive`, reading stdin.
    pub fn new(sub_ident: impl Into<String>, interactive: bool) -> Self {
        let input: Option<Input> = interactive.then(|| Box::new(tokio::io::stdin()) as Input);
        Self::with_io(sub_ident, input, Box::new(tokio::io::stdout()))
    }

    /// Creates a platform from configuration.
    pub fn from_config(config: &TerminalConfig) -> Self {
        Self::new(config.sub_ident.clone(), config.interactive)
    }

    /// Creates a platform over arbitrary streams. Without `input` the
    /// platform only prints.
    pub fn with_io(sub_ident: impl Into<String>, input: Option<Input>, output: Output) -> Self {
        Self {
            ident: ModuleIdentifier::new(TERMINAL_MAIN_IDENT, sub_ident),
            input: Mutex::new(input),
            output: tokio::sync::Mutex::new(output),
            reader: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    async fn print(&self, chat: &OutgoingChat) -> anyhow::Result<()> {
        let line = format!("[{}] {}\n", chat.destination, chat.text.plain_text());
        let mut output = self.output.lock().await;
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
        Ok(())
    }
}

async fn read_console(input: Input, ident: ModuleIdentifier, bus: Bus, cancel: CancellationToken) {
    let mut lines = BufReader::new(input).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    continue;
                }
                let chat = IncomingChat {
                    source: ident.clone(),
                    sender: format!("{ident}:{CONSOLE_REPLY_TARGET}"),
                    reply_to: CONSOLE_REPLY_TARGET.to_string(),
                    text: PlainText::shared(line),
                };
                if let Err(e) = bus.publish(chat).await {
                    debug!(module = %ident, error = %e, "Bus closed, stopping console input");
                    break;
                }
            }
            Ok(None) => {
                info!(module = %ident, "Console input closed");
                break;
            }
            Err(e) => {
                warn!(module = %ident, error = %e, "Console read failed");
                break;
            }
        }
    }
}

#[async_trait]
impl Module for TerminalPlatform {
    fn identifier(&self) -> ModuleIdentifier {
        self.ident.clone()
    }

    async fn on_register(&self, bus: Bus) {
        let input = self.input.lock().take();
        if let Some(input) = input {
            let handle = tokio::spawn(read_console(input, self.ident.clone(), bus, self.cancel.clone()));
            *self.reader.lock() = Some(handle);
        }
        info!(module = %self.ident, "Terminal platform registered");
    }

    async fn on_unregister(&self) {
        self.cancel.cancel();
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            // Stdin reads block a runtime thread and do not observe cancellation.
            reader.abort();
        }
        info!(module = %self.ident, "Terminal platform unregistered");
    }

    async fn on_message(&self, message: &BusMessage) -> anyhow::Result<()> {
        info!(module = %self.ident, kind = message.kind(), message = ?message, "Bus message");
        if let BusMessage::OutgoingChat(chat) = message {
            self.print(chat).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tern_core::ChatPayload;
    use tokio::io::{AsyncReadExt, duplex};
    use tokio::sync::mpsc;

    struct Listener(mpsc::UnboundedSender<IncomingChat>);

    #[async_trait]
    impl Module for Listener {
        fn identifier(&self) -> ModuleIdentifier {
            ModuleIdentifier::new("Module", "Listener")
        }

        async fn on_message(&self, message: &BusMessage) -> anyhow::Result<()> {
            if let BusMessage::IncomingChat(chat) = message {
                let _ = self.0.send(chat.clone());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_console_round_trip() {
        let bus = Bus::new();
        bus.start().unwrap();
        let (chat_tx, mut chat_rx) = mpsc::unbounded_channel();
        bus.register(Arc::new(Listener(chat_tx))).await.unwrap();

        let (mut keyboard, input) = duplex(256);
        let (output, mut screen) = duplex(256);
        let platform = TerminalPlatform::with_io("std", Some(Box::new(input) as Input), Box::new(output));
        bus.register(Arc::new(platform)).await.unwrap();

        keyboard.write_all(b"\nping\r\n").await.unwrap();
        let chat = tokio::time::timeout(Duration::from_secs(5), chat_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat.source, ModuleIdentifier::new("Terminal", "std"));
        assert_eq!(chat.sender, "Terminal:std:console");
        assert_eq!(chat.reply_to, "console");
        assert_eq!(chat.text.plain_text(), "ping");

        bus.publish(chat.make_reply(PlainText::shared("Pong"))).await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(5), screen.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"[console] Pong\n");

        bus.stop().await;
    }

    #[test]
    fn test_config_defaults() {
        let config = TerminalConfig::default();
        assert_eq!(config.sub_ident, "std");
        assert!(!config.interactive);
    }
}
