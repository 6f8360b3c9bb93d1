//! DCC (Direct Client-to-Client) file transfer subsystem.
//!
//! Offers arrive as DCC-kind [`Message`](crate::irc::Message)s and are handed
//! to the [`Engine`]. A single worker downloads them one at a time, resuming
//! partial files when the sender agrees, and reports back through a queue.

pub mod engine;
pub mod offer;
pub mod security;
pub mod transfer;

pub use engine::Engine;

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DccError {
    #[error("DCC engine is not running")]
    Stopped,
    #[error("message carries no DCC request")]
    NotDcc,
    #[error("unsupported DCC command {0:?}")]
    Unsupported(String),
    #[error("malformed DCC {command}: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },
    #[error("refusing unsafe file name {0:?}")]
    UnsafeName(String),
    #[error("refusing offer from private address {0}")]
    PrivateAddress(Ipv4Addr),
    #[error("file size {size} exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("no pending transfer on port {0}")]
    UnknownPort(u16),
    #[error("connect to sender timed out")]
    ConnectTimeout,
    #[error("transfer interrupted: no data for {0:?}")]
    Interrupted(Duration),
    #[error("connection closed after {received} of {expected} bytes")]
    Closed { received: u64, expected: u64 },
    #[error("sender sent {received} bytes, only {expected} announced")]
    Overflow { received: u64, expected: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A report from the engine about one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub peer: String,
    pub filename: String,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Progress {
        fraction: f64,
        received: u64,
        total: u64,
    },
    /// A partial file exists; ask the sender to continue from `position`.
    Resume { port: u16, position: u64 },
    Finished { path: PathBuf },
    Error(String),
}
