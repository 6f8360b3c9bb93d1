//! IRC wire messages.
//!
//! Parsing walks the line with a small cursor, one grammar element at a time:
//!
//! ```text
//! [@key=value;...] [:prefix] COMMAND [middle ...] [:trailing]
//! ```
//!
//! PRIVMSG and NOTICE bodies wrapped in `\x01` are further classified as
//! ACTION, DCC or plain CTCP and carry their descriptor in [`Kind`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use thiserror::Error;

/// Nick and command used for locally synthesized status lines.
pub const SYSTEM: &str = "SYSTEM";

const CTCP_DELIM: char = '\x01';

pub type Tags = BTreeMap<String, String>;

/// A CTCP request or reply, or the DCC request nested in one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ctcp {
    pub command: String,
    pub params: Vec<String>,
}

/// What a message carries, with the sub-protocol payload where there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Message,
    Action,
    Ctcp(Ctcp),
    Dcc(Ctcp),
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line has no command")]
    MissingCommand,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub tags: Tags,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub kind: Kind,
    /// Local time the message was parsed or created.
    pub time: DateTime<Local>,
}

/// Structural equality; the timestamp is not part of a message's identity.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
            && self.prefix == other.prefix
            && self.command == other.command
            && self.params == other.params
            && self.kind == other.kind
    }
}

impl Eq for Message {}

impl Message {
    pub fn new(prefix: Option<String>, command: &str, params: Vec<String>, kind: Kind) -> Self {
        Self {
            tags: Tags::new(),
            prefix,
            command: command.to_string(),
            params,
            kind,
            time: Local::now(),
        }
    }

    /// Something we sent ourselves, attributed to our nick for local echo.
    pub fn local(nick: &str, command: &str, params: Vec<String>, kind: Kind) -> Self {
        Self::new(Some(nick.to_string()), command, params, kind)
    }

    /// A status line that never went over the wire.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Some(SYSTEM.to_string()), SYSTEM, vec![text.into()], Kind::System)
    }

    /// Parse one line, with or without its terminator.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut cursor = Cursor::new(line);
        if cursor.is_empty() {
            return Err(ParseError::Empty);
        }

        let tags = cursor.tags().unwrap_or_default();
        let prefix = cursor.prefix().map(str::to_string);
        let command = cursor.command();
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params: Vec<String> = Vec::new();
        while let Some(param) = cursor.middle() {
            params.push(param.to_string());
        }

        let mut kind = Kind::Message;
        if let Some(trailing) = cursor.trailing() {
            let embedded = if is_text_command(command) {
                classify(trailing)
            } else {
                None
            };
            match embedded {
                Some((embedded_kind, body)) => {
                    kind = embedded_kind;
                    params.push(body.to_string());
                }
                None => params.push(trailing.to_string()),
            }
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_string(),
            params,
            kind,
            time: Local::now(),
        })
    }

    /// Nickname part of the prefix, the whole prefix for servers, or `""`.
    pub fn nick(&self) -> &str {
        match self.prefix.as_deref() {
            Some(prefix) => prefix.split_once('!').map_or(prefix, |(nick, _)| nick),
            None => "",
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }

    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    pub fn ctcp(&self) -> Option<&Ctcp> {
        match &self.kind {
            Kind::Ctcp(ctcp) => Some(ctcp),
            _ => None,
        }
    }

    pub fn dcc(&self) -> Option<&Ctcp> {
        match &self.kind {
            Kind::Dcc(dcc) => Some(dcc),
            _ => None,
        }
    }

    /// Replace one param in place. Only used to refresh status lines that are
    /// already on screen; returns `false` if there is no such param.
    pub fn set_param(&mut self, index: usize, value: impl Into<String>) -> bool {
        match self.params.get_mut(index) {
            Some(param) => {
                *param = value.into();
                true
            }
            None => false,
        }
    }
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_str("@")?;
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                write!(f, "{key}={value}")?;
            }
            f.write_str(" ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            match &self.kind {
                Kind::Action => write!(f, " :{CTCP_DELIM}ACTION {last}{CTCP_DELIM}")?,
                Kind::Ctcp(_) | Kind::Dcc(_) => write!(f, " :{CTCP_DELIM}{last}{CTCP_DELIM}")?,
                Kind::Message | Kind::System => write!(f, " :{last}")?,
            }
        }
        Ok(())
    }
}

fn is_text_command(command: &str) -> bool {
    command.eq_ignore_ascii_case("PRIVMSG") || command.eq_ignore_ascii_case("NOTICE")
}

/// Detect a `\x01`-wrapped body. Returns the kind and the text kept as the
/// trailing param: the action text for ACTION, the unwrapped body otherwise.
fn classify(trailing: &str) -> Option<(Kind, &str)> {
    let body = trailing
        .strip_prefix(CTCP_DELIM)?
        .strip_suffix(CTCP_DELIM)?;

    if let Some(action) = body.strip_prefix("ACTION ") {
        return Some((Kind::Action, action));
    }
    if let Some(request) = body.strip_prefix("DCC ") {
        let mut tokens = tokenize_quoted(request).into_iter();
        let command = tokens.next().unwrap_or_default();
        let dcc = Ctcp {
            command,
            params: tokens.collect(),
        };
        return Some((Kind::Dcc(dcc), body));
    }

    let mut tokens = body.split_whitespace().map(str::to_string);
    let ctcp = Ctcp {
        command: tokens.next().unwrap_or_default(),
        params: tokens.collect(),
    };
    Some((Kind::Ctcp(ctcp), body))
}

/// Split on spaces, keeping `"double quoted"` runs together as one token
/// without their quotes. An unterminated quote is kept literally.
pub fn tokenize_quoted(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start_matches(' ');

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            if let Some(end) = quoted.find('"') {
                tokens.push(quoted[..end].to_string());
                rest = quoted[end + 1..].trim_start_matches(' ');
                continue;
            }
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        tokens.push(rest[..end].to_string());
        rest = rest[end..].trim_start_matches(' ');
    }
    tokens
}

/// Parse the body of an `@` tag block. `None` if any entry is malformed.
fn parse_tags(raw: &str) -> Option<Tags> {
    let mut tags = Tags::new();
    for entry in raw.split(';').filter(|entry| !entry.is_empty()) {
        let (key, value) = entry.split_once('=')?;
        if key.is_empty() || value.contains('=') {
            return None;
        }
        tags.insert(key.to_string(), value.to_string());
    }
    Some(tags)
}

/// Forward-only view over the unparsed rest of a line.
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            rest: line.trim_start_matches(' '),
        }
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Everything up to the next space; the spaces after it are skipped.
    fn token(&mut self) -> &'a str {
        let rest = self.rest;
        match rest.find(' ') {
            Some(end) => {
                self.rest = rest[end..].trim_start_matches(' ');
                &rest[..end]
            }
            None => {
                self.rest = "";
                rest
            }
        }
    }

    /// The tag block, if present. Malformed tag text yields an empty map but
    /// is still consumed.
    fn tags(&mut self) -> Option<Tags> {
        if !self.rest.starts_with('@') {
            return None;
        }
        let block = &self.token()[1..];
        match parse_tags(block) {
            Some(tags) => Some(tags),
            None => {
                tracing::debug!(block, "Ignoring malformed tag block");
                Some(Tags::new())
            }
        }
    }

    fn prefix(&mut self) -> Option<&'a str> {
        if !self.rest.starts_with(':') {
            return None;
        }
        Some(&self.token()[1..])
    }

    fn command(&mut self) -> &'a str {
        self.token()
    }

    /// Next middle param. The last space-free token is left for
    /// [`Cursor::trailing`], as is anything starting with `:`.
    fn middle(&mut self) -> Option<&'a str> {
        if self.rest.starts_with(':') || !self.rest.contains(' ') {
            return None;
        }
        Some(self.token())
    }

    fn trailing(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.rest);
        Some(rest.strip_prefix(':').unwrap_or(rest))
    }
}
