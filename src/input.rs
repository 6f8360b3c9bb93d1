//! Line-oriented user input as an event source.
//!
//! Reading stdin blocks, so it happens on a plain thread rather than on the
//! runtime; a pending read then never holds up shutdown.

use std::io::{BufRead, BufReader};
use std::thread;

use tracing::warn;

use crate::event::queue::Drain;
use crate::event::{queue, Bell, Queue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// End of input. Nothing follows.
    Closed,
}

pub struct Input {
    inbox: Queue<InputEvent>,
    bell: Option<Bell>,
}

impl Input {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(std::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (producer, inbox, bell) = queue();
        let spawned = thread::Builder::new()
            .name("input".into())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            let line = line.trim_end_matches('\r').to_string();
                            if !producer.push(InputEvent::Line(line)) {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("Input failed: {e}");
                            break;
                        }
                    }
                }
                producer.push(InputEvent::Closed);
            });
        if let Err(e) = spawned {
            warn!("Could not start the input reader: {e}");
        }

        Self {
            inbox,
            bell: Some(bell),
        }
    }

    pub fn bell(&mut self) -> Option<Bell> {
        self.bell.take()
    }

    pub fn drain(&mut self) -> Drain<'_, InputEvent> {
        self.inbox.drain()
    }
}
