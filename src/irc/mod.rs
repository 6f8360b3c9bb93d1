//! IRC protocol layer: wire codec, transport, connection state and the
//! slash-command parser.

pub mod client;
pub mod commands;
pub mod message;
pub mod session;
pub mod transport;

pub use client::Client;
pub use message::{Ctcp, Kind, Message};
pub use session::State;
