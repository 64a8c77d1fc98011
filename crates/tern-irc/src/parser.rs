//! Streaming line parser.
//!
//! [`Parser`] accepts arbitrary byte chunks as they arrive from a socket,
//! buffers any partial line and yields one [`Message`] per complete
//! CRLF-terminated line, in input order. Lines that do not fit the grammar
//! are logged and skipped.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::wire::{Message, Tags, unescape_tag_value};

/// Longest line buffered while waiting for its terminator (tags included).
pub const MAX_LINE_LENGTH: usize = 8192 + 512;

/// Incremental IRC line decoder.
#[derive(Debug, Default)]
pub struct Parser {
    buffer: BytesMut,
    /// Set after an oversized line was dropped, until its terminator shows up.
    discarding: bool,
}

impl Parser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every message completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Message> {
        self.push(chunk);
        std::iter::from_fn(|| self.next_message()).collect()
    }

    /// Appends a chunk without decoding.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Decodes the next complete line, skipping malformed ones.
    ///
    /// Returns `None` once no complete line is buffered.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let Some(end) = find_crlf(&self.buffer) else {
                if self.buffer.len() > MAX_LINE_LENGTH {
                    warn!(buffered = self.buffer.len(), "Discarding oversized line");
                    self.buffer.clear();
                    self.discarding = true;
                }
                return None;
            };

            let line = self.buffer.split_to(end);
            self.buffer.advance(2);

            if std::mem::take(&mut self.discarding) {
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            match parse_line(&text) {
                Some(message) => return Some(message),
                None => debug!(line = %text, "Skipping malformed line"),
            }
        }
    }

    /// Number of bytes held for an incomplete line.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses one line without its terminator.
pub fn parse_line(line: &str) -> Option<Message> {
    if line.contains('\0') {
        return None;
    }

    let mut rest = line;
    let mut message = Message::default();

    if let Some(stripped) = rest.strip_prefix('@') {
        let (tags, tail) = next_token(stripped)?;
        message.tags = parse_tags(tags)?;
        rest = tail;
    }

    if let Some(stripped) = rest.strip_prefix(':') {
        let (source, tail) = next_token(stripped)?;
        message.source = Some(source.to_string());
        rest = tail;
    }

    let (command, mut rest) = match rest.split_once(' ') {
        Some((command, tail)) => (command, tail),
        None => (rest, ""),
    };
    if !is_valid_command(command) {
        return None;
    }
    message.command = command.to_string();

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            message.trailing = Some(trailing.to_string());
            break;
        }
        let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
        message.params.push(param.to_string());
        rest = tail;
    }

    Some(message)
}

/// Splits off a non-empty token and skips the spaces after it.
///
/// A token must be followed by something: tags and source never end a line.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let (token, tail) = s.split_once(' ')?;
    if token.is_empty() {
        return None;
    }
    let tail = tail.trim_start_matches(' ');
    if tail.is_empty() {
        return None;
    }
    Some((token, tail))
}

fn parse_tags(raw: &str) -> Option<Tags> {
    let mut tags = Tags::new();
    for item in raw.split(';').filter(|item| !item.is_empty()) {
        let (key, value) = item.split_once('=').unwrap_or((item, ""));
        if key.is_empty() {
            return None;
        }
        tags.insert(key.to_string(), unescape_tag_value(value));
    }
    Some(tags)
}

fn is_valid_command(command: &str) -> bool {
    let bytes = command.as_bytes();
    (!bytes.is_empty() && bytes.iter().all(u8::is_ascii_alphabetic))
        || (bytes.len() == 3 && bytes.iter().all(u8::is_ascii_digit))
}
