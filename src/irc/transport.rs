//! One TCP connection to an IRC server.
//!
//! A reader task turns the byte stream into lines and a writer task drains
//! the outbound queue. The owner only sees a receiver of [`TransportEvent`]s.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 512;
/// Longest line accepted: a full tag block plus a 512-byte message.
const MAX_LINE: usize = 8191 + 512;

#[derive(Debug)]
pub enum TransportEvent {
    Line(String),
    /// Delivered at most once; the transport is closed afterwards.
    Error(io::Error),
}

struct Shared {
    open: AtomicBool,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Shared {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn fail(&self, error: io::Error) {
        if self.open.swap(false, Ordering::AcqRel) {
            warn!("Transport failed: {error}");
            let _ = self.events.send(TransportEvent::Error(error));
        }
    }
}

pub struct Transport {
    outbound: Option<mpsc::UnboundedSender<String>>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl Transport {
    pub async fn open(
        host: &str,
        port: u16,
        read_timeout: Duration,
    ) -> io::Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        debug!(host, port, "Transport connected");

        let (read_half, write_half) = stream.into_split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            events: events_tx,
        });

        let reader = tokio::spawn(read_loop(read_half, read_timeout, shared.clone()));
        tokio::spawn(write_loop(write_half, outbound_rx, shared.clone()));

        Ok((
            Self {
                outbound: Some(outbound_tx),
                shared,
                reader,
            },
            events_rx,
        ))
    }

    /// Queue one line for writing; the terminator is added here.
    pub fn send(&self, line: &str) -> io::Result<()> {
        let outbound = match &self.outbound {
            Some(outbound) if self.shared.is_open() => outbound,
            _ => return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed")),
        };
        outbound
            .send(format!("{line}\r\n"))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task gone"))
    }

    /// Stop reading and let the writer flush what is already queued.
    pub fn close(&mut self) {
        self.shared.open.store(false, Ordering::Release);
        self.reader.abort();
        self.outbound = None;
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut reader: OwnedReadHalf, read_timeout: Duration, shared: Arc<Shared>) {
    let mut lines = LineBuffer::default();
    let mut chunk = [0u8; CHUNK_SIZE];

    while shared.is_open() {
        let read = match time::timeout(read_timeout, reader.read(&mut chunk)).await {
            Ok(read) => read,
            Err(_) => continue,
        };
        match read {
            Ok(0) => {
                shared.fail(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
            Ok(n) => {
                lines.extend(&chunk[..n]);
                while let Some(line) = lines.next_line() {
                    debug!("<< {line}");
                    if shared.events.send(TransportEvent::Line(line)).is_err() {
                        return;
                    }
                }
                if lines.overflowed() {
                    shared.fail(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
                }
            }
            Err(e) => shared.fail(e),
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
) {
    while let Some(line) = outbound.recv().await {
        debug!(">> {}", line.trim_end());
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            shared.fail(e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next non-empty line without its `\n` or `\r\n`.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.pending.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
        }
    }

    /// The unterminated remainder is longer than any valid line.
    pub(crate) fn overflowed(&self) -> bool {
        self.pending.len() > MAX_LINE
    }
}
