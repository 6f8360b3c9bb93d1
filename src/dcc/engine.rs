//! The DCC worker.
//!
//! Offers are queued with [`Engine::add`] and handled strictly one after
//! another by a single background task, which owns the port-to-offer table.
//! Results come back as [`Update`]s on the engine's own queue.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, warn};

use super::offer::{AcceptOffer, Offer, SendOffer};
use super::security::{self, Policy};
use super::transfer::{self, Plan, Progress};
use super::{DccError, Update, UpdateKind};
use crate::config::DccConfig;
use crate::event::queue::Drain;
use crate::event::{queue, Bell, Producer, Queue};
use crate::irc::Message;

/// What we know about a SEND offer until its transfer ends.
#[derive(Debug, Clone)]
struct Record {
    addr: Ipv4Addr,
    size: u64,
    filename: String,
    peer: String,
}

pub struct Engine {
    config: DccConfig,
    offers: Option<mpsc::UnboundedSender<Message>>,
    stop: Option<watch::Sender<bool>>,
    updates: Producer<Update>,
    inbox: Queue<Update>,
    bell: Option<Bell>,
}

impl Engine {
    pub fn new(config: DccConfig) -> Self {
        let (updates, inbox, bell) = queue();
        Self {
            config,
            offers: None,
            stop: None,
            updates,
            inbox,
            bell: Some(bell),
        }
    }

    /// The wake signal for the multiplexer. Can be taken once.
    pub fn bell(&mut self) -> Option<Bell> {
        self.bell.take()
    }

    /// Spawn the worker. Does nothing if it is already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let (offers_tx, offers_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = Worker {
            config: self.config.clone(),
            policy: Policy::from_config(&self.config),
            records: HashMap::new(),
            updates: self.updates.clone(),
        };
        tokio::spawn(worker.run(offers_rx, stop_rx));
        self.offers = Some(offers_tx);
        self.stop = Some(stop_tx);
        info!("DCC engine started");
    }

    /// Drop offers that have not started yet. A transfer in progress runs to
    /// completion.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
            info!("DCC engine stopped");
        }
        self.offers = None;
    }

    pub fn is_running(&self) -> bool {
        self.offers.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a DCC-kind message for the worker.
    pub fn add(&self, msg: Message) -> Result<(), DccError> {
        if msg.dcc().is_none() {
            return Err(DccError::NotDcc);
        }
        let offers = self.offers.as_ref().ok_or(DccError::Stopped)?;
        offers.send(msg).map_err(|_| DccError::Stopped)
    }

    pub fn drain(&mut self) -> Drain<'_, Update> {
        self.inbox.drain()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    config: DccConfig,
    policy: Policy,
    records: HashMap<u16, Record>,
    updates: Producer<Update>,
}

impl Worker {
    async fn run(
        mut self,
        mut offers: mpsc::UnboundedReceiver<Message>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = stop.changed() => break,
                msg = offers.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.process(msg).await;
        }
        debug!(pending = self.records.len(), "DCC worker exiting");
    }

    async fn process(&mut self, msg: Message) {
        let peer = msg.nick().to_string();
        let offer = match Offer::from_message(&msg) {
            Ok(offer) => offer,
            Err(e) => {
                let filename = msg
                    .dcc()
                    .and_then(|dcc| dcc.params.first())
                    .cloned()
                    .unwrap_or_default();
                warn!(%peer, "Rejected DCC request: {e}");
                self.emit(&peer, &filename, UpdateKind::Error(e.to_string()));
                return;
            }
        };

        let (port, filename, result) = match offer {
            Offer::Send(send) => {
                let port = send.port;
                let filename = security::sanitize_filename(&send.filename)
                    .unwrap_or_else(|| send.filename.clone());
                (port, filename, self.on_send(&peer, send).await)
            }
            Offer::Accept(accept) => {
                let port = accept.port;
                let filename = accept.filename.clone();
                (port, filename, self.on_accept(accept).await)
            }
        };

        match result {
            Ok(Some(path)) => {
                self.records.remove(&port);
                info!(%peer, path = %path.display(), "DCC transfer finished");
                self.emit(&peer, &filename, UpdateKind::Finished { path });
            }
            Ok(None) => {}
            Err(e) => {
                self.records.remove(&port);
                warn!(%peer, %filename, "DCC transfer failed: {e}");
                self.emit(&peer, &filename, UpdateKind::Error(e.to_string()));
            }
        }
    }

    /// Returns the finished path, or `None` when a resume was requested.
    async fn on_send(&mut self, peer: &str, send: SendOffer) -> Result<Option<PathBuf>, DccError> {
        let path = security::download_path(&self.config.download_dir, &send.filename)?;
        self.policy.check(send.addr, send.size)?;

        let record = Record {
            addr: send.addr,
            size: send.size,
            filename: file_name(&path),
            peer: peer.to_string(),
        };

        let existing = local_size(&path).await;
        if existing > 0 && !self.records.contains_key(&send.port) {
            debug!(port = send.port, existing, "Partial file found, asking to resume");
            self.records.insert(send.port, record.clone());
            self.emit(
                &record.peer,
                &record.filename,
                UpdateKind::Resume {
                    port: send.port,
                    position: existing,
                },
            );
            return Ok(None);
        }

        self.records.insert(send.port, record.clone());
        fs::create_dir_all(&self.config.download_dir).await?;
        let file = File::create(&path).await?;
        self.download(&record, send.port, file, 0).await?;
        Ok(Some(path))
    }

    async fn on_accept(&mut self, accept: AcceptOffer) -> Result<Option<PathBuf>, DccError> {
        let record = self
            .records
            .get(&accept.port)
            .cloned()
            .ok_or(DccError::UnknownPort(accept.port))?;
        let path = self.config.download_dir.join(&record.filename);

        let file = OpenOptions::new().append(true).open(&path).await?;
        let position = file.metadata().await?.len();
        if position != accept.position {
            debug!(position, offered = accept.position, "Resume position differs from local size");
        }
        self.download(&record, accept.port, file, position).await?;
        Ok(Some(path))
    }

    async fn download(
        &self,
        record: &Record,
        port: u16,
        mut file: File,
        offset: u64,
    ) -> Result<(), DccError> {
        let addr = SocketAddr::from((record.addr, port));
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs.max(1));
        let mut stream = time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DccError::ConnectTimeout)??;
        info!(%addr, filename = %record.filename, offset, "DCC transfer started");

        let plan = Plan {
            total: record.size,
            offset,
            packet_size: self.config.packet_size,
            progress_step: self.config.progress_step,
            read_timeout: Duration::from_secs(self.config.read_timeout_secs.max(1)),
        };
        transfer::receive(&mut stream, &mut file, &plan, |progress: Progress| {
            self.emit(
                &record.peer,
                &record.filename,
                UpdateKind::Progress {
                    fraction: progress.fraction,
                    received: progress.received,
                    total: progress.total,
                },
            );
        })
        .await?;

        // Finished; a failed shutdown no longer matters.
        let _ = stream.shutdown().await;
        Ok(())
    }

    fn emit(&self, peer: &str, filename: &str, kind: UpdateKind) {
        self.updates.push(Update {
            peer: peer.to_string(),
            filename: filename.to_string(),
            kind,
        });
    }
}

async fn local_size(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
