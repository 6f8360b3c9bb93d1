use std::collections::VecDeque;

use crate::config::UiConfig;
use crate::irc::{Kind, Message};

/// Identity of a room. Channel names are stored case-folded; query rooms
/// keep the nick exactly as first seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Server,
    Channel(String),
    Query(String),
}

impl RoomKey {
    pub fn for_target(name: &str) -> Self {
        if is_channel(name) {
            Self::Channel(irc_to_lower(name))
        } else {
            Self::Query(name.to_string())
        }
    }
}

pub fn is_channel(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

/// Lowercase using RFC 1459 case mapping, where `[]\~` are the uppercase
/// forms of `{}|^`.
pub fn irc_to_lower(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => c,
        })
        .collect()
}

#[derive(Debug)]
pub struct Room {
    pub key: RoomKey,
    pub title: String,
    pub messages: VecDeque<Message>,
    pub unread: bool,
    /// We were kicked from this channel and have not rejoined.
    pub left: bool,
}

impl Room {
    fn new(key: RoomKey, title: &str) -> Self {
        Self {
            key,
            title: title.to_string(),
            messages: VecDeque::new(),
            unread: false,
            left: false,
        }
    }

    fn add_message(&mut self, msg: Message, max_scrollback: usize) {
        self.messages.push_back(msg);
        while self.messages.len() > max_scrollback.max(1) {
            self.messages.pop_front();
        }
    }
}

#[derive(Debug)]
pub struct AppState {
    pub nick: String,
    pub timestamp_format: String,
    max_scrollback: usize,
    rooms: Vec<Room>,
    active: usize,
    /// Channel we asked to join; its JOIN makes it the active room.
    pub expected_room: Option<RoomKey>,
    /// The server room has been renamed after the first message's sender.
    pub server_named: bool,
    pub quitting: bool,
    /// The active room changed or the terminal was resized.
    pub redraw: bool,
    /// Messages appended or refreshed since the last drain, with their room.
    pub new_messages: Vec<(RoomKey, Message)>,
    // Room whose newest line is our latest nick-change announcement.
    nick_notice: Option<RoomKey>,
}

impl AppState {
    pub fn new(server_title: &str, nick: &str, ui: &UiConfig) -> Self {
        Self {
            nick: nick.to_string(),
            timestamp_format: ui.timestamp_format.clone(),
            max_scrollback: ui.max_scrollback,
            rooms: vec![Room::new(RoomKey::Server, server_title)],
            active: 0,
            expected_room: None,
            server_named: false,
            quitting: false,
            redraw: false,
            new_messages: Vec::new(),
            nick_notice: None,
        }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_room(&self) -> &Room {
        &self.rooms[self.active]
    }

    pub fn position(&self, key: &RoomKey) -> Option<usize> {
        self.rooms.iter().position(|room| &room.key == key)
    }

    pub fn title(&self, key: &RoomKey) -> Option<&str> {
        self.position(key).map(|i| self.rooms[i].title.as_str())
    }

    /// Index of the room for `name`, creating it at the end if needed.
    pub fn ensure_room(&mut self, name: &str) -> usize {
        let key = RoomKey::for_target(name);
        match self.position(&key) {
            Some(index) => index,
            None => {
                self.rooms.push(Room::new(key, name));
                self.rooms.len() - 1
            }
        }
    }

    pub fn rename_server(&mut self, title: &str) {
        self.rooms[0].title = title.to_string();
        self.server_named = true;
    }

    pub fn add_message(&mut self, index: usize, msg: Message) {
        let Some(room) = self.rooms.get_mut(index) else {
            return;
        };
        if self.nick_notice.as_ref() == Some(&room.key) {
            self.nick_notice = None;
        }
        self.new_messages.push((room.key.clone(), msg.clone()));
        room.add_message(msg, self.max_scrollback);
    }

    pub fn system_message(&mut self, index: usize, text: impl Into<String>) {
        self.add_message(index, Message::system(text));
    }

    /// Mark a room unread unless it is the one being looked at.
    pub fn mark_unread(&mut self, index: usize) {
        if index != self.active {
            if let Some(room) = self.rooms.get_mut(index) {
                room.unread = true;
            }
        }
    }

    pub fn set_left(&mut self, index: usize, left: bool) {
        if let Some(room) = self.rooms.get_mut(index) {
            room.left = left;
        }
    }

    pub fn set_active(&mut self, index: usize) {
        if let Some(room) = self.rooms.get_mut(index) {
            room.unread = false;
            self.active = index;
            self.redraw = true;
        }
    }

    pub fn next_room(&mut self) {
        self.set_active((self.active + 1) % self.rooms.len());
    }

    pub fn prev_room(&mut self) {
        let count = self.rooms.len();
        self.set_active((self.active + count - 1) % count);
    }

    /// Close a room and fall back to the one before it. The server room
    /// cannot be closed.
    pub fn remove_room(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.rooms.len() {
            return false;
        }
        let removed = self.rooms.remove(index);
        if self.nick_notice.as_ref() == Some(&removed.key) {
            self.nick_notice = None;
        }
        if self.active >= index {
            self.set_active(self.active - 1);
        }
        true
    }

    /// Show a nick change in the active room. A run of announcements with
    /// nothing in between collapses into the latest one.
    pub fn announce_nick(&mut self, text: String) {
        let index = self.active;
        let key = self.rooms[index].key.clone();
        if self.nick_notice.as_ref() == Some(&key) {
            if let Some(last) = self.rooms[index].messages.back_mut() {
                if last.kind == Kind::System && last.set_param(0, text.clone()) {
                    self.new_messages.push((key, last.clone()));
                    return;
                }
            }
        }
        self.system_message(index, text);
        self.nick_notice = Some(key);
    }
}
