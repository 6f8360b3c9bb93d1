use crate::app::action::Action;
use crate::app::state::*;
use crate::config::nickname::is_valid_nickname;
use crate::dcc::offer::resume_request;
use crate::dcc::{Update, UpdateKind};
use crate::irc::commands::{self, ParsedCommand};
use crate::irc::{Kind, Message};
use crate::signals::Signal;

/// Route one message from the server into its room.
pub fn handle_irc_message(state: &mut AppState, msg: Message) -> Vec<Action> {
    match msg.command.as_str() {
        "PRIVMSG" | "NOTICE" => return handle_text(state, msg),
        "JOIN" => {
            if let Some(name) = msg.trailing().map(str::to_string) {
                let index = state.ensure_room(&name);
                state.add_message(index, msg);
                state.set_left(index, false);
                let key = RoomKey::for_target(&name);
                if state.expected_room.as_ref() == Some(&key) {
                    state.expected_room = None;
                    state.set_active(index);
                }
            }
        }
        "PART" => {
            if let Some(name) = msg.trailing().map(str::to_string) {
                if is_me(state, msg.nick()) {
                    if let Some(index) = state.position(&RoomKey::for_target(&name)) {
                        state.remove_room(index);
                    }
                } else {
                    let index = state.ensure_room(&name);
                    state.add_message(index, msg);
                }
            }
        }
        "KICK" => {
            let (Some(channel), Some(victim)) = (msg.params.first(), msg.params.get(1)) else {
                return vec![];
            };
            let index = state.ensure_room(channel);
            if is_me(state, victim) {
                state.set_left(index, true);
            }
            state.add_message(index, msg);
            state.mark_unread(index);
        }
        "MODE" => {
            let index = if is_me(state, msg.nick()) {
                Some(0)
            } else {
                msg.target().map(str::to_string).map(|t| state.ensure_room(&t))
            };
            if let Some(index) = index {
                state.add_message(index, msg);
            }
        }
        "353" => {
            if let Some(name) = msg.params.get(2).cloned() {
                let index = state.ensure_room(&name);
                state.add_message(index, msg);
            }
        }
        "366" => {}
        "001" => {
            if let Some(nick) = msg.target() {
                state.nick = nick.to_string();
            }
            let index = state.active_index();
            state.add_message(index, msg);
        }
        "NICK" if is_me(state, msg.nick()) => {
            if let Some(nick) = msg.trailing() {
                state.nick = nick.to_string();
                state.announce_nick(format!("You are now known as {nick}"));
            }
        }
        _ => {
            let index = state.active_index();
            state.add_message(index, msg);
        }
    }
    vec![]
}

fn handle_text(state: &mut AppState, msg: Message) -> Vec<Action> {
    let Some(target) = msg.target().map(str::to_string) else {
        return vec![];
    };
    let sender = msg.nick().to_string();
    if !state.server_named && !sender.is_empty() {
        state.rename_server(&sender);
    }

    let index = if sender == "Global" || target == "*" {
        0
    } else if is_me(state, &target) {
        if sender.is_empty() {
            0
        } else {
            state.ensure_room(&sender)
        }
    } else {
        state.ensure_room(&target)
    };

    let mut actions = Vec::new();
    if matches!(msg.kind, Kind::Dcc(_)) {
        actions.push(Action::DccOffer(msg.clone()));
    }
    state.add_message(index, msg);
    state.mark_unread(index);
    actions
}

fn is_me(state: &AppState, nick: &str) -> bool {
    irc_to_lower(nick) == irc_to_lower(&state.nick)
}

/// A line typed by the user: a slash command or text for the active room.
pub fn handle_input(state: &mut AppState, line: &str) -> Vec<Action> {
    if line.trim().is_empty() {
        return vec![];
    }
    match commands::parse_command(line) {
        Some(command) => handle_command(state, command),
        None => say(state, line),
    }
}

fn say(state: &mut AppState, text: &str) -> Vec<Action> {
    let index = state.active_index();
    if state.active_room().key == RoomKey::Server {
        state.system_message(index, "Join a channel or use /msg to talk");
        return vec![];
    }
    if state.active_room().left {
        state.system_message(index, "You've left this room");
        return vec![];
    }

    let title = state.active_room().title.clone();
    let echo = Message::local(
        &state.nick,
        "PRIVMSG",
        vec![title.clone(), text.to_string()],
        Kind::Message,
    );
    state.add_message(index, echo);
    vec![Action::Send(format!("PRIVMSG {title} :{text}"))]
}

fn handle_command(state: &mut AppState, command: ParsedCommand) -> Vec<Action> {
    let index = state.active_index();
    let room_key = state.active_room().key.clone();
    let room_title = state.active_room().title.clone();

    match command {
        ParsedCommand::Join { args: Some(args) } => {
            if let Some(first) = args.split([',', ' ']).find(|c| !c.is_empty()) {
                state.expected_room = Some(RoomKey::for_target(first));
            }
            vec![Action::Send(format!("JOIN {args}"))]
        }
        ParsedCommand::Join { args: None } => {
            if matches!(room_key, RoomKey::Channel(_)) && state.active_room().left {
                state.expected_room = Some(room_key);
                vec![Action::Send(format!("JOIN {room_title}"))]
            } else {
                state.system_message(index, "Usage: /join <channel>[,<channel>...] [keys]");
                vec![]
            }
        }
        ParsedCommand::Part => match room_key {
            RoomKey::Server => {
                state.system_message(index, "The server room cannot be closed");
                vec![]
            }
            RoomKey::Channel(_) if !state.active_room().left => {
                vec![Action::Send(format!("PART {room_title}"))]
            }
            _ => {
                state.remove_room(index);
                vec![]
            }
        },
        ParsedCommand::Msg { target, text } => {
            let target_index = state.ensure_room(&target);
            let mut actions = Vec::new();
            if let Some(text) = text {
                let echo = Message::local(
                    &state.nick,
                    "PRIVMSG",
                    vec![target.clone(), text.clone()],
                    Kind::Message,
                );
                state.add_message(target_index, echo);
                actions.push(Action::Send(format!("PRIVMSG {target} :{text}")));
            }
            state.set_active(target_index);
            actions
        }
        ParsedCommand::Me { text } => {
            if room_key == RoomKey::Server || state.active_room().left {
                state.system_message(index, "Nobody to act to here");
                return vec![];
            }
            let echo = Message::local(
                &state.nick,
                "PRIVMSG",
                vec![room_title.clone(), text.clone()],
                Kind::Action,
            );
            state.add_message(index, echo);
            vec![Action::Send(format!("PRIVMSG {room_title} :\x01ACTION {text}\x01"))]
        }
        ParsedCommand::Quit { reason } => vec![Action::Quit { reason }],
        ParsedCommand::Kick { nick, reason } => {
            if !matches!(room_key, RoomKey::Channel(_)) {
                state.system_message(index, "Not in a channel");
                return vec![];
            }
            let line = match reason {
                Some(reason) => format!("KICK {room_title} {nick} :{reason}"),
                None => format!("KICK {room_title} {nick}"),
            };
            vec![Action::Send(line)]
        }
        ParsedCommand::Mode { params } => {
            let target = match room_key {
                RoomKey::Server => state.nick.clone(),
                _ => room_title,
            };
            vec![Action::Send(format!("MODE {target} {params}"))]
        }
        ParsedCommand::Nick { nick } => {
            if is_valid_nickname(&nick) {
                vec![Action::Send(format!("NICK {nick}"))]
            } else {
                state.system_message(index, format!("Invalid nickname: {nick}"));
                vec![]
            }
        }
        ParsedCommand::Connect => vec![Action::Connect],
        ParsedCommand::Raw { line } => vec![Action::Send(line)],
        ParsedCommand::Next => {
            state.next_room();
            vec![]
        }
        ParsedCommand::Prev => {
            state.prev_room();
            vec![]
        }
        ParsedCommand::Invalid { usage } => {
            state.system_message(index, format!("Usage: {usage}"));
            vec![]
        }
        ParsedCommand::Unknown { line } => vec![Action::Send(line)],
    }
}

/// Show a transfer report in the sender's query room.
pub fn handle_dcc_update(state: &mut AppState, update: Update) -> Vec<Action> {
    let index = state.ensure_room(&update.peer);
    let name = &update.filename;
    let mut actions = Vec::new();

    let text = match &update.kind {
        UpdateKind::Progress {
            fraction,
            received,
            total,
        } => format!(
            "{name}: {:.0}% ({received}/{total} bytes)",
            fraction * 100.0
        ),
        UpdateKind::Resume { port, position } => {
            actions.push(Action::Send(format!(
                "PRIVMSG {} :{}",
                update.peer,
                resume_request(name, *port, *position)
            )));
            format!("{name}: asking to resume from byte {position}")
        }
        UpdateKind::Finished { path } => format!("{name}: saved to {}", path.display()),
        UpdateKind::Error(error) => format!("{name}: transfer failed: {error}"),
    };
    state.system_message(index, text);
    state.mark_unread(index);
    actions
}

pub fn handle_signal(state: &mut AppState, signal: Signal) -> Vec<Action> {
    if signal.is_quit() {
        vec![Action::Quit { reason: None }]
    } else {
        state.redraw = true;
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UiConfig;
    use std::path::PathBuf;

    fn state() -> AppState {
        AppState::new("irc.example.org", "me", &UiConfig::default())
    }

    fn recv(state: &mut AppState, line: &str) -> Vec<Action> {
        handle_irc_message(state, Message::parse(line).unwrap())
    }

    fn titles(state: &AppState) -> Vec<&str> {
        state.rooms().iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn first_text_message_names_the_server_room() {
        let mut s = state();
        recv(&mut s, ":irc.libera.chat NOTICE * :Looking up your hostname");
        recv(&mut s, ":other.server NOTICE * :ignored for naming");
        assert_eq!(titles(&s), vec!["irc.libera.chat"]);
        assert_eq!(s.rooms()[0].messages.len(), 2);
    }

    #[test]
    fn private_messages_open_a_query_room() {
        let mut s = state();
        recv(&mut s, ":alice!u@h PRIVMSG me :hi");
        recv(&mut s, ":bob!u@h PRIVMSG #rust :hello");
        recv(&mut s, ":Global!u@h NOTICE me :maintenance");

        assert_eq!(titles(&s), vec!["alice", "alice", "#rust"]);
        assert!(s.rooms()[1].unread);
        assert!(s.rooms()[2].unread);
        assert_eq!(s.rooms()[0].messages.len(), 1);
    }

    #[test]
    fn text_without_target_is_dropped() {
        let mut s = state();
        recv(&mut s, ":alice!u@h PRIVMSG");
        assert_eq!(s.rooms().len(), 1);
        assert!(s.new_messages.is_empty());
    }

    #[test]
    fn dcc_offers_are_forwarded() {
        let mut s = state();
        let actions = recv(
            &mut s,
            ":bot!u@h PRIVMSG me :\x01DCC SEND file.bin 2130706433 5000 10\x01",
        );
        assert!(matches!(actions.as_slice(), [Action::DccOffer(m)] if m.nick() == "bot"));
        assert_eq!(titles(&s), vec!["bot", "bot"]);
    }

    #[test]
    fn join_of_the_expected_room_activates_it() {
        let mut s = state();
        let actions = handle_input(&mut s, "/join #Rust");
        assert_eq!(actions, vec![Action::Send("JOIN #Rust".into())]);

        recv(&mut s, ":someone!u@h JOIN #tokio");
        assert_eq!(s.active_index(), 0);
        recv(&mut s, ":me!u@h JOIN #rust");
        assert_eq!(s.active_room().title, "#rust");
        assert!(s.expected_room.is_none());
    }

    #[test]
    fn own_part_removes_the_room() {
        let mut s = state();
        s.ensure_room("#a");
        let b = s.ensure_room("#b");
        s.set_active(b);

        recv(&mut s, ":other!u@h PART #b");
        assert_eq!(s.rooms().len(), 3);
        recv(&mut s, ":me!u@h PART #B");
        assert_eq!(titles(&s), vec!["irc.example.org", "#a"]);
        assert_eq!(s.active_room().title, "#a");
    }

    #[test]
    fn kick_marks_the_room_left_and_join_rejoins() {
        let mut s = state();
        let chan = s.ensure_room("#rust");
        s.set_active(chan);

        recv(&mut s, ":op!u@h KICK #rust me :bye");
        assert!(s.rooms()[chan].left);

        let actions = handle_input(&mut s, "hello?");
        assert!(actions.is_empty());
        assert_eq!(
            s.active_room().messages.back().and_then(|m| m.trailing()),
            Some("You've left this room")
        );

        let actions = handle_input(&mut s, "/join");
        assert_eq!(actions, vec![Action::Send("JOIN #rust".into())]);
        recv(&mut s, ":me!u@h JOIN #rust");
        assert!(!s.rooms()[chan].left);
    }

    #[test]
    fn names_and_mode_routing() {
        let mut s = state();
        recv(&mut s, ":srv 353 me = #rust :me alice");
        recv(&mut s, ":srv 366 me #rust :End of /NAMES list.");
        recv(&mut s, ":me!u@h MODE me +i");
        recv(&mut s, ":op!u@h MODE #rust +v alice");

        assert_eq!(s.rooms()[0].messages.len(), 1);
        assert_eq!(s.rooms()[1].messages.len(), 2);
    }

    #[test]
    fn welcome_and_own_nick_change_update_our_nick() {
        let mut s = state();
        recv(&mut s, ":srv 001 me_ :Welcome");
        assert_eq!(s.nick, "me_");
        recv(&mut s, ":me_!u@h NICK :newme");
        recv(&mut s, ":newme!u@h NICK :newer");
        assert_eq!(s.nick, "newer");
        let last = s.rooms()[0].messages.back().unwrap();
        assert_eq!(last.trailing(), Some("You are now known as newer"));
        assert_eq!(s.rooms()[0].messages.len(), 2);
    }

    #[test]
    fn plain_text_is_echoed_and_sent() {
        let mut s = state();
        let chan = s.ensure_room("#rust");
        s.set_active(chan);

        let actions = handle_input(&mut s, "hello all");
        assert_eq!(actions, vec![Action::Send("PRIVMSG #rust :hello all".into())]);
        let echo = s.active_room().messages.back().unwrap();
        assert_eq!(echo.nick(), "me");
        assert_eq!(echo.params, vec!["#rust", "hello all"]);
    }

    #[test]
    fn plain_text_in_the_server_room_is_not_sent() {
        let mut s = state();
        assert!(handle_input(&mut s, "hello").is_empty());
        assert!(handle_input(&mut s, "   ").is_empty());
    }

    #[test]
    fn msg_and_me() {
        let mut s = state();
        let actions = handle_input(&mut s, "/msg alice hey");
        assert_eq!(actions, vec![Action::Send("PRIVMSG alice :hey".into())]);
        assert_eq!(s.active_room().title, "alice");

        let actions = handle_input(&mut s, "/me waves");
        assert_eq!(
            actions,
            vec![Action::Send("PRIVMSG alice :\x01ACTION waves\x01".into())]
        );
        assert_eq!(s.active_room().messages.back().unwrap().kind, Kind::Action);
    }

    #[test]
    fn part_rules() {
        let mut s = state();
        assert!(handle_input(&mut s, "/part").is_empty());
        assert_eq!(s.rooms().len(), 1);

        let chan = s.ensure_room("#rust");
        s.set_active(chan);
        assert_eq!(handle_input(&mut s, "/q"), vec![Action::Send("PART #rust".into())]);

        handle_input(&mut s, "/msg bob");
        assert!(handle_input(&mut s, "/part").is_empty());
        assert_eq!(titles(&s), vec!["irc.example.org", "#rust"]);
    }

    #[test]
    fn kick_mode_nick_and_passthrough() {
        let mut s = state();
        let chan = s.ensure_room("#rust");
        s.set_active(chan);

        assert_eq!(
            handle_input(&mut s, "/kick troll spam"),
            vec![Action::Send("KICK #rust troll :spam".into())]
        );
        assert_eq!(
            handle_input(&mut s, "/mode +m"),
            vec![Action::Send("MODE #rust +m".into())]
        );
        assert_eq!(
            handle_input(&mut s, "/nick better"),
            vec![Action::Send("NICK better".into())]
        );
        assert!(handle_input(&mut s, "/nick 1bad").is_empty());
        assert_eq!(
            handle_input(&mut s, "/whois alice"),
            vec![Action::Send("whois alice".into())]
        );
        assert_eq!(
            handle_input(&mut s, "/raw PING :x"),
            vec![Action::Send("PING :x".into())]
        );
        assert_eq!(
            handle_input(&mut s, "/quit gone"),
            vec![Action::Quit {
                reason: Some("gone".into())
            }]
        );
        assert_eq!(handle_input(&mut s, "/connect"), vec![Action::Connect]);
    }

    #[test]
    fn resume_update_asks_the_peer() {
        let mut s = state();
        let actions = handle_dcc_update(
            &mut s,
            Update {
                peer: "bot".into(),
                filename: "my file.bin".into(),
                kind: UpdateKind::Resume {
                    port: 5000,
                    position: 42,
                },
            },
        );
        assert_eq!(
            actions,
            vec![Action::Send(
                "PRIVMSG bot :\x01DCC RESUME \"my file.bin\" 5000 42\x01".into()
            )]
        );
        assert_eq!(titles(&s), vec!["irc.example.org", "bot"]);
    }

    #[test]
    fn other_updates_are_only_shown() {
        let mut s = state();
        let actions = handle_dcc_update(
            &mut s,
            Update {
                peer: "bot".into(),
                filename: "a.bin".into(),
                kind: UpdateKind::Finished {
                    path: PathBuf::from("/tmp/a.bin"),
                },
            },
        );
        assert!(actions.is_empty());
        let last = s.rooms()[1].messages.back().unwrap();
        assert_eq!(last.trailing(), Some("a.bin: saved to /tmp/a.bin"));
    }

    #[test]
    fn signals() {
        let mut s = state();
        assert!(handle_signal(&mut s, Signal::WindowChanged).is_empty());
        assert!(s.redraw);
        assert_eq!(
            handle_signal(&mut s, Signal::Interrupt),
            vec![Action::Quit { reason: None }]
        );
    }
}
