//! IRC wire message model.
//!
//! A line has the shape `[@tags ][:source ]COMMAND[ param]*[ :trailing]`.
//! [`Message`] keeps the trailing segment separate from the middle
//! parameters so that handlers can tell `PRIVMSG #a :b` from `PRIVMSG #a b`.

use std::collections::BTreeMap;
use std::fmt;

/// Line terminator.
pub const CRLF: &str = "\r\n";

/// Message tags, ordered by key. An empty value serializes as a bare key.
pub type Tags = BTreeMap<String, String>;

/// A decoded or outbound IRC message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// IRCv3 message tags, unescaped.
    pub tags: Tags,
    /// Source prefix without the leading `:`.
    pub source: Option<String>,
    /// Command word or three-digit numeric.
    pub command: String,
    /// Middle parameters.
    pub params: Vec<String>,
    /// Trailing parameter without the leading `:`.
    pub trailing: Option<String>,
}

impl Message {
    /// Creates a message with only a command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Appends middle parameters.
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Sets the trailing parameter.
    pub fn with_trailing(mut self, trailing: impl Into<String>) -> Self {
        self.trailing = Some(trailing.into());
        self
    }

    /// Sets the source prefix.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    // =========================================================================
    // Common commands
    // =========================================================================

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("PRIVMSG").with_params([target]).with_trailing(text)
    }

    /// `NOTICE <target> :<text>`
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("NOTICE").with_params([target]).with_trailing(text)
    }

    /// `JOIN <channel>`
    pub fn join(channel: impl Into<String>) -> Self {
        Self::new("JOIN").with_params([channel])
    }

    /// `PART <channel>[ :<reason>]`
    pub fn part(channel: impl Into<String>, reason: Option<String>) -> Self {
        let msg = Self::new("PART").with_params([channel]);
        match reason {
            Some(reason) => msg.with_trailing(reason),
            None => msg,
        }
    }

    /// `NICK <nick>`
    pub fn nick(nick: impl Into<String>) -> Self {
        Self::new("NICK").with_params([nick])
    }

    /// `QUIT[ :<reason>]`
    pub fn quit(reason: Option<String>) -> Self {
        let msg = Self::new("QUIT");
        match reason {
            Some(reason) => msg.with_trailing(reason),
            None => msg,
        }
    }

    /// `PING :<token>`
    pub fn ping(token: impl Into<String>) -> Self {
        Self::new("PING").with_trailing(token)
    }

    /// `PONG :<token>`
    pub fn pong(token: impl Into<String>) -> Self {
        Self::new("PONG").with_trailing(token)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the middle parameter at `index`.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Returns the trailing parameter, falling back to the last middle parameter.
    ///
    /// Servers may omit the `:` when the final argument has no spaces.
    pub fn last_param(&self) -> Option<&str> {
        self.trailing.as_deref().or_else(|| self.params.last().map(String::as_str))
    }

    /// Parses the source prefix.
    pub fn parsed_source(&self) -> Option<Source> {
        self.source.as_deref().map(Source::parse)
    }

    /// Returns `true` for three-digit numeric replies.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serializes the message into a CRLF-terminated line.
    ///
    /// CR, LF and NUL are stripped from every field. A final middle
    /// parameter that could not be sent bare (empty, containing a space or
    /// starting with `:`) is written as the trailing segment.
    pub fn serialize(&self) -> String {
        let mut line = String::with_capacity(64);

        if !self.tags.is_empty() {
            line.push('@');
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    line.push(';');
                }
                line.push_str(&strip_line_breaks(key));
                if !value.is_empty() {
                    line.push('=');
                    line.push_str(&escape_tag_value(value));
                }
            }
            line.push(' ');
        }

        if let Some(source) = &self.source {
            line.push(':');
            line.push_str(&strip_line_breaks(source));
            line.push(' ');
        }

        line.push_str(&strip_line_breaks(&self.command));

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let param = strip_line_breaks(param);
            let needs_trailing =
                param.is_empty() || param.contains(' ') || param.starts_with(':');
            line.push(' ');
            if needs_trailing && i == last && self.trailing.is_none() {
                line.push(':');
            }
            line.push_str(&param);
        }

        if let Some(trailing) = &self.trailing {
            line.push_str(" :");
            line.push_str(&strip_line_breaks(trailing));
        }

        line.push_str(CRLF);
        line
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.serialize().trim_end_matches(CRLF))
    }
}

fn strip_line_breaks(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '\r' | '\n' | '\0')).collect()
}

/// Escapes a tag value.
pub fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\0' => {}
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`escape_tag_value`].
///
/// Unknown escapes yield the escaped character; a lone trailing backslash is dropped.
pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// A parsed source prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Nick, or a server name when no user/host part is present.
    pub name: String,
    /// Username (`!user`).
    pub user: Option<String>,
    /// Host (`@host`).
    pub host: Option<String>,
}

impl Source {
    /// Splits `nick!user@host`. Anything else is returned as a bare name.
    pub fn parse(source: &str) -> Self {
        if let Some((name, rest)) = source.split_once('!')
            && let Some((user, host)) = rest.split_once('@')
        {
            return Self {
                name: name.to_string(),
                user: Some(user.to_string()),
                host: Some(host.to_string()),
            };
        }
        Self {
            name: source.to_string(),
            user: None,
            host: None,
        }
    }

    /// Returns the nick (or server name).
    pub fn nick(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_shapes() {
        assert_eq!(Message::privmsg("#rust", "hello world").serialize(), "PRIVMSG #rust :hello world\r\n");
        assert_eq!(Message::join("#rust").serialize(), "JOIN #rust\r\n");
        assert_eq!(Message::quit(None).serialize(), "QUIT\r\n");
        assert_eq!(
            Message::new("USER").with_params(["tern", "0", "*"]).with_trailing("Tern Bot").serialize(),
            "USER tern 0 * :Tern Bot\r\n"
        );
        assert_eq!(Message::pong("").serialize(), "PONG :\r\n");
    }

    #[test]
    fn test_serialize_promotes_unsafe_last_param() {
        let msg = Message::new("TOPIC").with_params(["#a", "two words"]);
        assert_eq!(msg.serialize(), "TOPIC #a :two words\r\n");
    }

    #[test]
    fn test_serialize_strips_line_injection() {
        let msg = Message::privmsg("#a", "hi\r\nQUIT :bye");
        assert_eq!(msg.serialize(), "PRIVMSG #a :hiQUIT :bye\r\n");
    }

    #[test]
    fn test_serialize_tags_and_source() {
        let msg = Message::privmsg("#a", "x")
            .with_source("nick!user@host")
            .with_tag("label", "a b;c")
            .with_tag("draft/flag", "");
        assert_eq!(msg.serialize(), "@draft/flag;label=a\\sb\\:c :nick!user@host PRIVMSG #a :x\r\n");
    }

    #[test]
    fn test_tag_unescape() {
        assert_eq!(unescape_tag_value("a\\sb\\:c\\\\d"), "a b;c\\d");
        assert_eq!(unescape_tag_value("x\\"), "x");
        assert_eq!(unescape_tag_value("\\q"), "q");
    }

    #[test]
    fn test_source_parse() {
        let full = Source::parse("alice!~a@example.org");
        assert_eq!(full.nick(), "alice");
        assert_eq!(full.user.as_deref(), Some("~a"));
        assert_eq!(full.host.as_deref(), Some("example.org"));

        let server = Source::parse("irc.example.org");
        assert_eq!(server.name, "irc.example.org");
        assert!(server.user.is_none());

        // '@' before '!' is not a user mask.
        assert_eq!(Source::parse("a@b!c").user, None);
    }
}
