//! Plain one-line rendering of messages for the terminal.

use chrono::TimeZone;

use crate::irc::{Kind, Message};

/// `[room] HH:MM nick text`, with mIRC formatting codes removed.
pub fn format_line(title: &str, msg: &Message, timestamp_format: &str) -> String {
    let time = msg.time.format(timestamp_format);
    let text = strip_formatting(&describe(msg));
    match msg.kind {
        Kind::Action => format!("[{title}] {time} * {} {text}", msg.nick()),
        Kind::System => format!("[{title}] {time} -- {text}"),
        _ => format!("[{title}] {time} {} {text}", msg.nick()),
    }
}

/// The human-readable body of a message.
pub fn describe(msg: &Message) -> String {
    let params = &msg.params;
    let from = |start: usize| params.get(start..).unwrap_or_default().join(" ");
    let param = |index: usize| params.get(index).map(String::as_str).unwrap_or_default();
    let last = params.last().map(String::as_str).unwrap_or_default();

    match msg.command.as_str() {
        "PRIVMSG" | "NOTICE" => match &msg.kind {
            Kind::Ctcp(_) => format!("sent 'CTCP {}' request to {}", from(1), param(0)),
            Kind::Dcc(_) => format!("sent '{}' request to {}", from(1), param(0)),
            Kind::Action => last.to_string(),
            Kind::Message | Kind::System => from(1),
        },
        "JOIN" => format!("has joined {last}"),
        "PART" => format!("has left {}", param(0)),
        "KICK" => format!("kicked {} [{}]", param(1), from(2)),
        "QUIT" => "has quit".to_string(),
        "NICK" => format!("is now known as {last}"),
        "MODE" => format!("set mode {} for {}", from(1), param(0)),
        "353" => format!("Users: {}", last.split_whitespace().collect::<Vec<_>>().join(", ")),
        "332" => format!("Topic: {}", from(2)),
        "333" => {
            let when = param(3)
                .parse::<i64>()
                .ok()
                .and_then(|secs| chrono::Local.timestamp_opt(secs, 0).single())
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| param(3).to_string());
            format!("Topic in {} set by {} at {when}", param(1), param(2))
        }
        "001" | "002" | "003" | "004" | "251" | "252" | "253" | "254" | "255" | "265"
        | "266" | "372" | "375" | "376" => from(1),
        crate::irc::message::SYSTEM => from(0),
        cmd if is_error_numeric(cmd) => format!("ERROR {cmd}: {}", from(1)),
        cmd => format!("{cmd} {}", from(0)),
    }
}

fn is_error_numeric(command: &str) -> bool {
    command.len() == 3 && command.starts_with('4') && command.bytes().all(|b| b.is_ascii_digit())
}

/// Remove mIRC bold, italic, underline, reverse, reset and color codes.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x02' | '\x0F' | '\x16' | '\x1D' | '\x1F' => {}
            '\x03' => {
                // Foreground (1-2 digits), then optional ",background".
                skip_digits(&mut chars);
                let mut ahead = chars.clone();
                if ahead.next() == Some(',') && ahead.peek().is_some_and(char::is_ascii_digit) {
                    chars.next();
                    skip_digits(&mut chars);
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn skip_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for _ in 0..2 {
        if chars.peek().is_some_and(char::is_ascii_digit) {
            chars.next();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Message {
        Message::parse(line).unwrap()
    }

    #[test]
    fn describes_common_commands() {
        assert_eq!(describe(&parse(":a!u@h JOIN #rust")), "has joined #rust");
        assert_eq!(describe(&parse(":a!u@h PART #rust :bye")), "has left #rust");
        assert_eq!(
            describe(&parse(":op!u@h KICK #rust troll :spam")),
            "kicked troll [spam]"
        );
        assert_eq!(
            describe(&parse(":op!u@h MODE #rust +o alice")),
            "set mode +o alice for #rust"
        );
        assert_eq!(
            describe(&parse(":srv 353 me = #rust :alice @bob")),
            "Users: alice, @bob"
        );
        assert_eq!(
            describe(&parse(":srv 433 me taken :Nickname is already in use")),
            "ERROR 433: taken Nickname is already in use"
        );
        assert_eq!(describe(&Message::system("hello")), "hello");
    }

    #[test]
    fn formats_messages_and_actions() {
        let msg = parse(":alice!u@h PRIVMSG #rust :hi there");
        let line = format_line("#rust", &msg, "");
        assert_eq!(line, "[#rust]  alice hi there");

        let action = parse(":alice!u@h PRIVMSG #rust :\x01ACTION waves\x01");
        assert_eq!(format_line("#rust", &action, ""), "[#rust]  * alice waves");
    }

    #[test]
    fn strips_mirc_codes() {
        assert_eq!(strip_formatting("\x02bold\x02 \x0304,01red\x03 plain"), "bold red plain");
        assert_eq!(strip_formatting("\x0312blue\x0F, fine"), "blue, fine");
        assert_eq!(strip_formatting("\x03,x"), ",x");
    }
}
