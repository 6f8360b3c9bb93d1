//! Connection state machine, free of sockets.
//!
//! [`Session::handle`] maps one inbound message to an [`Outcome`]; the
//! client decides what to do with the transport based on it.

use super::message::{Ctcp, Kind, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Connecting,
    Registering,
    Connected,
    Closing,
}

/// What a single inbound message asks of the client.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Lines to write back, in order.
    pub replies: Vec<String>,
    /// Messages for the consumer queue, in order.
    pub deliver: Vec<Message>,
    /// Registration completed with this message.
    pub entered_connected: bool,
    /// The server confirmed our QUIT; drop the transport.
    pub teardown: bool,
}

#[derive(Debug)]
pub struct Session {
    state: State,
    nick: String,
    password: Option<String>,
    version: String,
}

impl Session {
    pub fn new(nick: &str, password: Option<String>, version: &str) -> Self {
        Self {
            state: State::Closed,
            nick: nick.to_string(),
            password,
            version: version.to_string(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Closed -> Connecting. `false` in any other state.
    pub fn begin_connect(&mut self) -> bool {
        if self.state != State::Closed {
            return false;
        }
        self.state = State::Connecting;
        true
    }

    /// Connected -> Closing, returning the QUIT line to send.
    pub fn begin_close(&mut self, reason: Option<&str>) -> Option<String> {
        if self.state != State::Connected {
            return None;
        }
        self.state = State::Closing;
        Some(match reason {
            Some(reason) if !reason.is_empty() => format!("QUIT :{reason}"),
            _ => "QUIT".to_string(),
        })
    }

    pub fn reset(&mut self) {
        self.state = State::Closed;
    }

    pub fn handle(&mut self, msg: Message) -> Outcome {
        let mut outcome = Outcome::default();

        if self.state == State::Connecting {
            self.state = State::Registering;
            outcome.replies.extend(self.registration());
        }

        match msg.command.as_str() {
            "PING" => {
                let token = msg.params.first().map_or("", String::as_str);
                outcome.replies.push(format!("PONG :{token}"));
                return outcome;
            }
            "ERROR" if self.state == State::Closing => {
                self.state = State::Closed;
                outcome.teardown = true;
            }
            "001" if self.state == State::Registering => {
                self.state = State::Connected;
                outcome.entered_connected = true;
                if let Some(nick) = msg.target() {
                    self.nick = nick.to_string();
                }
            }
            "NICK" if msg.nick() == self.nick => {
                if let Some(nick) = msg.trailing() {
                    self.nick = nick.to_string();
                }
            }
            "PRIVMSG" if is_version_request(&msg) => {
                let reply = self.version_reply(msg.nick());
                outcome
                    .replies
                    .push(format!("NOTICE {} :\x01VERSION {}\x01", msg.nick(), self.version));
                outcome.deliver.push(msg);
                outcome.deliver.push(reply);
                return outcome;
            }
            _ => {}
        }

        outcome.deliver.push(msg);
        outcome
    }

    fn registration(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        if let Some(password) = &self.password {
            lines.push(format!("PASS {password}"));
        }
        lines.push(format!("NICK {}", self.nick));
        lines.push(format!("USER {0} 0 * :{0}", self.nick));
        lines
    }

    fn version_reply(&self, peer: &str) -> Message {
        let ctcp = Ctcp {
            command: "VERSION".to_string(),
            params: self.version.split_whitespace().map(str::to_string).collect(),
        };
        Message::local(
            &self.nick,
            "NOTICE",
            vec![peer.to_string(), format!("VERSION {}", self.version)],
            Kind::Ctcp(ctcp),
        )
    }
}

fn is_version_request(msg: &Message) -> bool {
    msg.ctcp()
        .is_some_and(|ctcp| ctcp.command == "VERSION" && ctcp.params.is_empty())
}
