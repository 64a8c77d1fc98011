//! Chat payload contract.
//!
//! The bus carries chat text opaquely. A payload only has to render itself
//! as plain text and round-trip through a single-string intermediate form
//! that can be stored and later turned back into the same payload. Rich
//! formatting models live outside the core and implement [`ChatPayload`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while decoding a payload from its intermediate form.
#[derive(Debug, Clone, Error)]
pub enum PayloadError {
    /// The intermediate string is not valid for this payload type.
    #[error("invalid intermediate form: {0}")]
    InvalidIntermediate(String),
}

/// Behaviour the core requires from a chat payload.
pub trait ChatPayload: fmt::Debug + Send + Sync {
    /// Renders the payload as plain text, dropping any formatting.
    fn plain_text(&self) -> String;

    /// Serializes the payload into its intermediate form.
    fn to_intermediate(&self) -> String;
}

/// Decoding side of the intermediate-form round trip.
pub trait FromIntermediate: ChatPayload + Sized {
    /// Reconstructs a payload from [`ChatPayload::to_intermediate`] output.
    fn from_intermediate(s: &str) -> Result<Self, PayloadError>;
}

/// Shared, type-erased payload as carried by bus messages.
pub type ChatText = Arc<dyn ChatPayload>;

/// Unformatted text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainText(pub String);

impl PlainText {
    /// Creates a plain text payload.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Wraps the text into a shareable [`ChatText`].
    pub fn shared(text: impl Into<String>) -> ChatText {
        Arc::new(Self::new(text))
    }
}

impl ChatPayload for PlainText {
    fn plain_text(&self) -> String {
        self.0.clone()
    }

    fn to_intermediate(&self) -> String {
        self.0.clone()
    }
}

impl FromIntermediate for PlainText {
    fn from_intermediate(s: &str) -> Result<Self, PayloadError> {
        Ok(Self::new(s))
    }
}

impl From<&str> for PlainText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for PlainText {
    fn from(text: String) -> Self {
        Self(text)
    }
}
