//! The IRC platform module.
//!
//! [`IrcPlatform`] registers on the bus as `IRC:<sub>` and bridges one
//! [`Client`] session:
//!
//! - inbound `PRIVMSG` becomes a broadcast [`IncomingChat`];
//! - [`OutgoingChat`] addressed to the platform becomes one `PRIVMSG` per line;
//! - [`ModuleControl`] verbs `join`, `part`, `nick` and `quit` drive the session.

use std::sync::{Arc, Weak};

use anyhow::{Context, bail};
use async_trait::async_trait;
use tern_core::{
    Bus, BusMessage, IncomingChat, Module, ModuleControl, ModuleIdentifier, OutgoingChat,
    PlainText,
};
use tern_irc::{Client, ClientConfig, IrcResult, Message};
use tracing::{debug, info, warn};

use crate::config::IrcNetworkConfig;
use crate::format::strip_formatting;

/// Main identifier of IRC platform modules.
pub const IRC_MAIN_IDENT: &str = "IRC";

/// Bus module wrapping one IRC session.
pub struct IrcPlatform {
    ident: ModuleIdentifier,
    client: Arc<Client>,
    auto_join: Vec<String>,
}

impl IrcPlatform {
    /// Creates a platform for `IRC:<sub_ident>`. Nothing is dialled until [`IrcPlatform::connect`].
    pub fn new(sub_ident: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            ident: ModuleIdentifier::new(IRC_MAIN_IDENT, sub_ident),
            client: Arc::new(Client::new(config)),
            auto_join: Vec::new(),
        }
    }

    /// Creates a platform from a network entry.
    pub fn from_config(config: &IrcNetworkConfig) -> Self {
        Self::new(config.sub_ident.clone(), config.client.clone()).with_auto_join(config.auto_join.clone())
    }

    /// Sets the channels joined once registration completes.
    pub fn with_auto_join(mut self, channels: Vec<String>) -> Self {
        self.auto_join = channels;
        self
    }

    /// Connects the session. Call after the platform is registered so that
    /// nothing the server sends is missed.
    pub async fn connect(&self) -> IrcResult<()> {
        self.client.connect().await
    }

    /// The underlying session.
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    async fn send_chat(&self, chat: &OutgoingChat) -> anyhow::Result<()> {
        let text = chat.text.plain_text();
        for line in text.lines().filter(|line| !line.is_empty()) {
            self.client
                .send_message(Message::privmsg(chat.destination.as_str(), line))
                .await
                .with_context(|| format!("sending to {}", chat.destination))?;
        }
        Ok(())
    }

    async fn handle_control(&self, control: &ModuleControl) -> anyhow::Result<()> {
        let rest = || {
            let words = control.argv.get(2..).unwrap_or_default();
            (!words.is_empty()).then(|| words.join(" "))
        };

        let message = match control.verb() {
            Some("join") => Message::join(required(control, "channel")?),
            Some("part") => Message::part(required(control, "channel")?, rest()),
            Some("nick") => Message::nick(required(control, "nick")?),
            Some("quit") => {
                let words = control.argv.get(1..).unwrap_or_default();
                Message::quit((!words.is_empty()).then(|| words.join(" ")))
            }
            Some(verb) => {
                debug!(module = %self.ident, verb = %verb, "Ignoring unknown control verb");
                return Ok(());
            }
            None => bail!("control message without a verb"),
        };

        debug!(module = %self.ident, command = %message.command, "Control command");
        self.client.send_message(message).await?;
        Ok(())
    }
}

fn required<'a>(control: &'a ModuleControl, what: &str) -> anyhow::Result<&'a str> {
    match control.arg(1) {
        Some(arg) => Ok(arg),
        None => bail!("'{}' requires a {what}", control.verb().unwrap_or_default()),
    }
}

/// Converts an inbound `PRIVMSG` into a bus chat line.
///
/// Direct messages (target equal to our nick) are answered to the sender.
fn incoming_chat(ident: &ModuleIdentifier, own_nick: &str, message: &Message) -> Option<IncomingChat> {
    if message.command != "PRIVMSG" {
        return None;
    }
    let target = message.param(0)?;
    let source = message.source.as_deref().unwrap_or_default();
    let text = message.trailing.as_deref().or(message.param(1))?;

    let reply_to = if target.eq_ignore_ascii_case(own_nick) {
        message.parsed_source().map(|s| s.name).unwrap_or_else(|| target.to_string())
    } else {
        target.to_string()
    };

    Some(IncomingChat {
        source: ident.clone(),
        sender: format!("{ident}:{source}"),
        reply_to,
        text: PlainText::shared(strip_formatting(text)),
    })
}

#[async_trait]
impl Module for IrcPlatform {
    fn identifier(&self) -> ModuleIdentifier {
        self.ident.clone()
    }

    async fn on_register(&self, bus: Bus) {
        let ident = self.ident.clone();
        // Weak: the client owns this callback.
        let client: Weak<Client> = Arc::downgrade(&self.client);
        let chat_bus = bus.clone();
        self.client.set_message_handler(move |message: Message| {
            let ident = ident.clone();
            let client = client.clone();
            let bus = chat_bus.clone();
            async move {
                let Some(client) = client.upgrade() else { return };
                let Some(chat) = incoming_chat(&ident, &client.nick(), &message) else {
                    return;
                };
                if let Err(e) = bus.publish(chat).await {
                    debug!(module = %ident, error = %e, "Dropping inbound chat");
                }
            }
        });

        let ident = self.ident.clone();
        let channels = self.auto_join.clone();
        self.client.set_post_init_callback(move || {
            let ident = ident.clone();
            let channels = channels.clone();
            let bus = bus.clone();
            async move {
                info!(module = %ident, "Registered with IRC server");
                for channel in channels {
                    let join = ModuleControl::new(ident.clone(), ["join", channel.as_str()]);
                    if let Err(e) = bus.publish(join).await {
                        warn!(module = %ident, channel = %channel, error = %e, "Failed to request auto-join");
                    }
                }
            }
        });

        info!(module = %self.ident, address = %self.client.config().address, "IRC platform registered");
    }

    async fn on_unregister(&self) {
        self.client.close().await;
        info!(module = %self.ident, "IRC platform unregistered");
    }

    async fn on_message(&self, message: &BusMessage) -> anyhow::Result<()> {
        match message {
            BusMessage::OutgoingChat(chat) => self.send_chat(chat).await,
            BusMessage::ModuleControl(control) => self.handle_control(control).await,
            BusMessage::IncomingChat(_) | BusMessage::ModuleRegistered(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tern_core::ChatPayload;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::TcpListener;
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::sync::mpsc;

    fn ident() -> ModuleIdentifier {
        ModuleIdentifier::new("IRC", "test")
    }

    #[test]
    fn test_channel_message() {
        let message = tern_irc::parse_line(":alice!a@host PRIVMSG #rust :\u{02}ping\u{02}").unwrap();
        let chat = incoming_chat(&ident(), "tern", &message).unwrap();
        assert_eq!(chat.source, ident());
        assert_eq!(chat.sender, "IRC:test:alice!a@host");
        assert_eq!(chat.reply_to, "#rust");
        assert_eq!(chat.text.plain_text(), "ping");
    }

    #[test]
    fn test_direct_message_replies_to_sender() {
        let message = tern_irc::parse_line(":alice!a@host PRIVMSG Tern :hi").unwrap();
        let chat = incoming_chat(&ident(), "tern", &message).unwrap();
        assert_eq!(chat.reply_to, "alice");
    }

    #[test]
    fn test_non_chat_is_ignored() {
        let message = tern_irc::parse_line(":alice!a@host JOIN #rust").unwrap();
        assert!(incoming_chat(&ident(), "tern", &message).is_none());
    }

    async fn next_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> String {
        tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("connection closed")
    }

    /// Forwards every incoming chat to a channel.
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
    async fn test_bridges_session_and_bus() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap().to_string();

        let bus = Bus::new();
        bus.start().unwrap();
        let (chat_tx, mut chat_rx) = mpsc::unbounded_channel();
        bus.register(Arc::new(Listener(chat_tx))).await.unwrap();

        let platform = Arc::new(
            IrcPlatform::new("test", ClientConfig::new(address, "tern")).with_auto_join(vec!["#rust".into()]),
        );
        bus.register(platform.clone()).await.unwrap();
        platform.connect().await.unwrap();

        let (socket, _) = server.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        for expected in ["CAP LS 302", "NICK tern", "USER tern 0 * :tern"] {
            assert_eq!(next_line(&mut lines).await, expected);
        }

        // End of MOTD triggers the auto-join through the bus.
        write.write_all(b":srv 376 tern :End of MOTD\r\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "JOIN #rust");

        write
            .write_all(b":alice!a@host PRIVMSG #rust :\x1Dhello\x1D bot\r\n")
            .await
            .unwrap();
        let chat = tokio::time::timeout(Duration::from_secs(5), chat_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat.text.plain_text(), "hello bot");

        bus.publish(chat.make_reply(PlainText::shared("line one\nline two")))
            .await
            .unwrap();
        assert_eq!(next_line(&mut lines).await, "PRIVMSG #rust :line one");
        assert_eq!(next_line(&mut lines).await, "PRIVMSG #rust :line two");

        bus.publish(ModuleControl::new(ident(), ["part", "#rust", "see", "you"]))
            .await
            .unwrap();
        assert_eq!(next_line(&mut lines).await, "PART #rust :see you");

        bus.stop().await;
        assert_eq!(platform.client().state(), tern_irc::ClientState::Closed);
    }
}
