//! Messages exchanged over the module bus.
//!
//! [`BusMessage`] is a closed set of variants. Two of them are *targeted*
//! and routed by their [`ModuleIdentifier`] ([`OutgoingChat`],
//! [`ModuleControl`]); the other two are broadcast to every module.

use std::collections::HashMap;

use serde_json::Value;

use crate::ident::ModuleIdentifier;
use crate::payload::ChatText;

/// Typed side channel for values a control argv cannot carry.
///
/// This is a deliberately loose escape hatch: its keys are a convention
/// between the sending and receiving modules and the bus never reads it.
pub type ControlData = HashMap<String, Value>;

/// A chat line received by a platform adapter.
#[derive(Debug, Clone)]
pub struct IncomingChat {
    /// Platform module that received the line.
    pub source: ModuleIdentifier,
    /// Platform-qualified identity of the sender.
    pub sender: String,
    /// Where a reply should go (channel, nick, console, ...).
    pub reply_to: String,
    /// The chat text.
    pub text: ChatText,
}

impl IncomingChat {
    /// Builds a reply addressed to the platform and conversation this line came from.
    pub fn make_reply(&self, text: ChatText) -> OutgoingChat {
        OutgoingChat {
            target: self.source.clone(),
            destination: self.reply_to.clone(),
            text,
        }
    }
}

/// A chat line a platform adapter should deliver.
#[derive(Debug, Clone)]
pub struct OutgoingChat {
    /// Platform module that should send the line.
    pub target: ModuleIdentifier,
    /// Platform-specific destination.
    pub destination: String,
    /// The chat text.
    pub text: ChatText,
}

/// A stringly-typed command for another module.
///
/// `argv[0]` is a verb only the receiving module understands (`join`,
/// `setperm`, ...).
#[derive(Debug, Clone)]
pub struct ModuleControl {
    /// Module that should handle the command.
    pub target: ModuleIdentifier,
    /// Verb followed by its arguments.
    pub argv: Vec<String>,
    /// Extra typed values.
    pub data: ControlData,
}

impl ModuleControl {
    /// Creates a control message without side-channel data.
    pub fn new<I, S>(target: ModuleIdentifier, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target,
            argv: argv.into_iter().map(Into::into).collect(),
            data: ControlData::new(),
        }
    }

    /// Attaches a side-channel value.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Returns the verb, if any.
    pub fn verb(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Returns the argument at `index` (the verb is index 0).
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.argv.get(index).map(String::as_str)
    }
}

/// Every message kind the bus can carry.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// Broadcast: a chat line arrived on some platform.
    IncomingChat(IncomingChat),
    /// Targeted: a chat line to send on a platform.
    OutgoingChat(OutgoingChat),
    /// Targeted: a control command.
    ModuleControl(ModuleControl),
    /// Broadcast: a module has joined the bus.
    ModuleRegistered(ModuleIdentifier),
}

impl BusMessage {
    /// Returns the routing target of targeted messages, `None` for broadcasts.
    pub fn target(&self) -> Option<&ModuleIdentifier> {
        match self {
            Self::OutgoingChat(msg) => Some(&msg.target),
            Self::ModuleControl(msg) => Some(&msg.target),
            Self::IncomingChat(_) | Self::ModuleRegistered(_) => None,
        }
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IncomingChat(_) => "incoming_chat",
            Self::OutgoingChat(_) => "outgoing_chat",
            Self::ModuleControl(_) => "module_control",
            Self::ModuleRegistered(_) => "module_registered",
        }
    }
}

impl From<IncomingChat> for BusMessage {
    fn from(msg: IncomingChat) -> Self {
        Self::IncomingChat(msg)
    }
}

impl From<OutgoingChat> for BusMessage {
    fn from(msg: OutgoingChat) -> Self {
        Self::OutgoingChat(msg)
    }
}

impl From<ModuleControl> for BusMessage {
    fn from(msg: ModuleControl) -> Self {
        Self::ModuleControl(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PlainText;

    #[test]
    fn test_make_reply_targets_source() {
        let incoming = IncomingChat {
            source: ModuleIdentifier::new("IRC", "libera"),
            sender: "IRC:libera:alice!a@host".into(),
            reply_to: "#rust".into(),
            text: PlainText::shared("ping"),
        };

        let reply = incoming.make_reply(PlainText::shared("pong"));
        assert_eq!(reply.target, incoming.source);
        assert_eq!(reply.destination, "#rust");
        assert_eq!(reply.text.plain_text(), "pong");
    }

    #[test]
    fn test_targets() {
        let control = ModuleControl::new(ModuleIdentifier::new("Module", "Command"), ["setperm", "bob"])
            .with_data("level", 100);
        assert_eq!(control.verb(), Some("setperm"));
        assert_eq!(control.arg(1), Some("bob"));
        assert_eq!(control.data["level"], 100);

        let msg = BusMessage::from(control);
        assert_eq!(msg.target().map(ToString::to_string).as_deref(), Some("Module:Command"));

        let announce = BusMessage::ModuleRegistered(ModuleIdentifier::new("IRC", "x"));
        assert!(announce.target().is_none());
    }
}
