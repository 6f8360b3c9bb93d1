//! User slash-command parser.
//!
//! Parses `/command arg1 arg2 ...` input lines into typed [`ParsedCommand`]
//! values that the application can act on.

/// A parsed user command. Each variant corresponds to a `/command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// `/join` with no arguments rejoins the active channel.
    Join { args: Option<String> },
    Part,
    Msg { target: String, text: Option<String> },
    Me { text: String },
    Quit { reason: Option<String> },
    Kick { nick: String, reason: Option<String> },
    Mode { params: String },
    Nick { nick: String },
    Connect,
    Raw { line: String },
    Next,
    Prev,
    /// A known command without its required arguments.
    Invalid { usage: &'static str },
    /// Anything else; sent to the server without the slash.
    Unknown { line: String },
}

/// Parse a slash-command string into a [`ParsedCommand`].
///
/// Returns `None` if the input does not start with `/`. Command names are
/// case-insensitive.
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim();
    let body = input.strip_prefix('/')?;

    let (cmd, rest) = match body.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (body, ""),
    };
    let rest = (!rest.is_empty()).then(|| rest.to_string());

    let parsed = match cmd.to_lowercase().as_str() {
        "join" | "j" => ParsedCommand::Join { args: rest },
        "part" | "q" => ParsedCommand::Part,
        "msg" | "query" => match rest {
            Some(rest) => {
                let (target, text) = split_word(&rest);
                ParsedCommand::Msg { target, text }
            }
            None => ParsedCommand::Invalid {
                usage: "/msg <nick> [text]",
            },
        },
        "me" => match rest {
            Some(text) => ParsedCommand::Me { text },
            None => ParsedCommand::Invalid { usage: "/me <text>" },
        },
        "quit" | "exit" => ParsedCommand::Quit { reason: rest },
        "kick" => match rest {
            Some(rest) => {
                let (nick, reason) = split_word(&rest);
                ParsedCommand::Kick { nick, reason }
            }
            None => ParsedCommand::Invalid {
                usage: "/kick <nick> [reason]",
            },
        },
        "mode" => match rest {
            Some(params) => ParsedCommand::Mode { params },
            None => ParsedCommand::Invalid {
                usage: "/mode <params>",
            },
        },
        "nick" => match rest {
            Some(rest) => ParsedCommand::Nick {
                nick: split_word(&rest).0,
            },
            None => ParsedCommand::Invalid { usage: "/nick <nick>" },
        },
        "connect" => ParsedCommand::Connect,
        "raw" | "quote" => match rest {
            Some(line) => ParsedCommand::Raw { line },
            None => ParsedCommand::Invalid { usage: "/raw <line>" },
        },
        "next" => ParsedCommand::Next,
        "prev" => ParsedCommand::Prev,
        _ => ParsedCommand::Unknown {
            line: body.to_string(),
        },
    };
    Some(parsed)
}

/// Split off the first word; the remainder is `None` when blank.
fn split_word(text: &str) -> (String, Option<String>) {
    match text.split_once(' ') {
        Some((word, rest)) => {
            let rest = rest.trim();
            (word.to_string(), (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (text.to_string(), None),
    }
}
