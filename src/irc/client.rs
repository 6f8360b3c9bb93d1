//! IRC client: one [`Transport`] driven by a [`Session`].
//!
//! Background tasks own the socket; the consumer only sees a [`Bell`] and a
//! queue of parsed [`Message`]s. Connection state sits behind a mutex that
//! never leaves this module.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;
use tracing::{debug, info, warn};

use super::message::Message;
use super::session::{Session, State};
use super::transport::{Transport, TransportEvent};
use crate::config::{ClientConfig, ServerConfig};
use crate::event::{queue, Bell, Producer, Queue};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("already connected or connecting")]
    NotClosed,
    #[error("not connected")]
    NotConnected,
    #[error("could not connect to {host}:{port}: {error}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        error: io::Error,
    },
    #[error("send failed: {0}")]
    Io(#[from] io::Error),
}

struct Link {
    session: Session,
    transport: Option<Transport>,
    /// Bumped for every transport; events tagged with an older value are stale.
    generation: u64,
}

struct Inner {
    server: ServerConfig,
    config: ClientConfig,
    link: Mutex<Link>,
    events: Producer<Message>,
}

pub struct Client {
    inner: Arc<Inner>,
    inbox: Queue<Message>,
    bell: Option<Bell>,
}

impl Client {
    pub fn new(server: ServerConfig, config: ClientConfig) -> Self {
        let (events, inbox, bell) = queue();
        let session = Session::new(
            &server.nickname,
            server.password.clone(),
            &config.version_string,
        );
        Self {
            inner: Arc::new(Inner {
                server,
                config,
                link: Mutex::new(Link {
                    session,
                    transport: None,
                    generation: 0,
                }),
                events,
            }),
            inbox,
            bell: Some(bell),
        }
    }

    /// The wake signal for the multiplexer. Can be taken once.
    pub fn bell(&mut self) -> Option<Bell> {
        self.bell.take()
    }

    pub fn drain(&mut self) -> crate::event::queue::Drain<'_, Message> {
        self.inbox.drain()
    }

    pub fn state(&self) -> State {
        self.inner.lock().session.state()
    }

    pub fn nick(&self) -> String {
        self.inner.lock().session.nick().to_string()
    }

    /// Open the connection and start reading. Registration begins with the
    /// first line the server sends.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.begin_connect()?;
        let (generation, events) = self.inner.open_link().await?;
        tokio::spawn(run_link(self.inner.clone(), generation, events));
        Ok(())
    }

    /// Like [`Client::connect`], but returns once the attempt has started.
    /// A failure to connect shows up as a system message.
    pub fn spawn_connect(&self) -> Result<(), ClientError> {
        self.inner.begin_connect()?;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Ok((generation, events)) = inner.open_link().await {
                run_link(inner, generation, events).await;
            }
        });
        Ok(())
    }

    /// Send QUIT. The transport is dropped once the server answers with ERROR.
    pub fn close(&self, reason: Option<&str>) -> Result<(), ClientError> {
        let mut link = self.inner.lock();
        let quit = link
            .session
            .begin_close(reason)
            .ok_or(ClientError::NotConnected)?;
        info!("Closing connection");
        match &link.transport {
            Some(transport) => transport.send(&quit)?,
            None => return Err(ClientError::NotConnected),
        }
        Ok(())
    }

    /// Write one raw line. Only allowed once registration is complete.
    pub fn send(&self, line: &str) -> Result<(), ClientError> {
        let link = self.inner.lock();
        if link.session.state() != State::Connected {
            return Err(ClientError::NotConnected);
        }
        let transport = link
            .transport
            .as_ref()
            .filter(|transport| transport.is_open())
            .ok_or(ClientError::NotConnected)?;
        transport.send(line)?;
        Ok(())
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_connect(&self) -> Result<(), ClientError> {
        if self.lock().session.begin_connect() {
            Ok(())
        } else {
            Err(ClientError::NotClosed)
        }
    }

    /// Open a transport for a session that is already `Connecting`.
    async fn open_link(&self) -> Result<(u64, UnboundedReceiver<TransportEvent>), ClientError> {
        let host = self.server.host.as_str();
        let port = self.server.port;
        let read_timeout = Duration::from_secs(self.config.read_timeout_secs.max(1));
        info!(host, port, "Connecting");

        match Transport::open(host, port, read_timeout).await {
            Ok((transport, events)) => {
                let mut link = self.lock();
                link.generation += 1;
                link.transport = Some(transport);
                Ok((link.generation, events))
            }
            Err(error) => {
                self.lock().session.reset();
                warn!(host, port, "Connect failed: {error}");
                self.events.push(Message::system(format!(
                    "Could not connect to {host}:{port}: {error}"
                )));
                Err(ClientError::Connect {
                    host: host.to_string(),
                    port,
                    error,
                })
            }
        }
    }

    /// Run one inbound line through the session. Returns `false` once this
    /// transport is finished with.
    fn on_line(self: &Arc<Self>, generation: u64, line: &str) -> bool {
        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping line {line:?}: {e}");
                return true;
            }
        };

        let mut link = self.lock();
        if link.generation != generation {
            return false;
        }
        let outcome = link.session.handle(msg);
        if let Some(transport) = &link.transport {
            for reply in &outcome.replies {
                if let Err(e) = transport.send(reply) {
                    warn!("Reply not sent: {e}");
                }
            }
        }
        if outcome.teardown {
            info!("Server closed the link");
            if let Some(mut transport) = link.transport.take() {
                transport.close();
            }
        }
        drop(link);

        if outcome.entered_connected {
            info!("Registered");
            self.spawn_keepalive(generation);
        }
        for msg in outcome.deliver {
            self.events.push(msg);
        }
        !outcome.teardown
    }

    /// Reset after a transport failure. Returns `true` if a reconnect should
    /// follow, in which case the session is already `Connecting` again.
    fn on_failure(&self, generation: u64, error: io::Error) -> bool {
        let mut link = self.lock();
        if link.generation != generation {
            return false;
        }
        let previous = link.session.state();
        link.session.reset();
        if let Some(mut transport) = link.transport.take() {
            transport.close();
        }
        let reconnect = !matches!(previous, State::Closed | State::Closing);
        if reconnect {
            link.session.begin_connect();
        }
        drop(link);

        self.events
            .push(Message::system(format!("Connection lost: {error}")));
        reconnect
    }

    fn spawn_keepalive(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        let period = Duration::from_secs(self.config.keepalive_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let sent = {
                    let link = inner.lock();
                    let current = link.generation == generation
                        && link.session.state() == State::Connected;
                    match &link.transport {
                        Some(transport) if current => {
                            let stamp = chrono::Utc::now().timestamp();
                            transport.send(&format!("PING :{stamp}")).is_ok()
                        }
                        _ => false,
                    }
                };
                if !sent {
                    break;
                }
            }
            debug!(generation, "Keepalive stopped");
        });
    }
}

/// Pump transport events until the link ends, reconnecting after failures.
async fn run_link(
    inner: Arc<Inner>,
    mut generation: u64,
    mut events: UnboundedReceiver<TransportEvent>,
) {
    loop {
        let error = loop {
            match events.recv().await {
                Some(TransportEvent::Line(line)) => {
                    if !inner.on_line(generation, &line) {
                        return;
                    }
                }
                Some(TransportEvent::Error(error)) => break error,
                None => return,
            }
        };

        if !inner.on_failure(generation, error) {
            return;
        }
        info!("Reconnecting");
        match inner.open_link().await {
            Ok((next, receiver)) => {
                generation = next;
                events = receiver;
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::message::Kind;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(3);

    struct Server {
        lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Server {
        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = time::timeout(WAIT, listener.accept())
                .await
                .expect("client should connect")
                .unwrap();
            let (read, writer) = stream.into_split();
            Self {
                lines: BufReader::new(read).lines(),
                writer,
            }
        }

        async fn say(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .unwrap();
        }

        async fn expect(&mut self) -> String {
            time::timeout(WAIT, self.lines.next_line())
                .await
                .expect("client should write")
                .unwrap()
                .expect("stream still open")
        }
    }

    async fn setup() -> (Client, TcpListener) {
        setup_with(ClientConfig {
            read_timeout_secs: 1,
            ..ClientConfig::default()
        })
        .await
    }

    async fn setup_with(config: ClientConfig) -> (Client, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ServerConfig {
            host: "127.0.0.1".into(),
            port: listener.local_addr().unwrap().port(),
            nickname: "me".into(),
            password: None,
        };
        (Client::new(server, config), listener)
    }

    async fn registered(client: &Client, listener: &TcpListener) -> Server {
        client.connect().await.unwrap();
        let mut server = Server::accept(listener).await;
        server.say(":srv NOTICE * :hello").await;
        assert_eq!(server.expect().await, "NICK me");
        assert_eq!(server.expect().await, "USER me 0 * :me");
        server.say(":srv 001 me :Welcome").await;
        wait_for(client, State::Connected).await;
        server
    }

    async fn wait_for(client: &Client, state: State) {
        time::timeout(WAIT, async {
            while client.state() != state {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("client never reached {state:?}"));
    }

    #[tokio::test]
    async fn ping_is_answered_and_not_queued() {
        let (mut client, listener) = setup().await;
        let mut server = registered(&client, &listener).await;

        server.say("PING :server123").await;
        assert_eq!(server.expect().await, "PONG :server123");

        let commands: Vec<String> = client.drain().map(|m| m.command).collect();
        assert_eq!(commands, vec!["NOTICE", "001"]);
    }

    #[tokio::test]
    async fn version_request_queues_request_and_reply() {
        let (mut client, listener) = setup().await;
        let mut server = registered(&client, &listener).await;
        let _ = client.drain().count();

        server.say(":peer!u@h PRIVMSG me :\x01VERSION\x01").await;
        let reply = server.expect().await;
        assert!(reply.starts_with("NOTICE peer :\x01VERSION ircloop"));

        let queued: Vec<Message> = client.drain().collect();
        assert_eq!(queued.len(), 2);
        assert!(matches!(queued[0].kind, Kind::Ctcp(_)));
        assert_eq!(queued[1].command, "NOTICE");
    }

    #[tokio::test]
    async fn state_guards() {
        let (client, listener) = setup().await;
        assert!(matches!(client.close(None), Err(ClientError::NotConnected)));
        assert!(matches!(client.send("PRIVMSG x :y"), Err(ClientError::NotConnected)));

        let mut server = registered(&client, &listener).await;
        assert!(matches!(client.connect().await, Err(ClientError::NotClosed)));

        client.send("PRIVMSG #c :hi").unwrap();
        assert_eq!(server.expect().await, "PRIVMSG #c :hi");
    }

    #[tokio::test]
    async fn close_waits_for_server_error() {
        let (client, listener) = setup().await;
        let mut server = registered(&client, &listener).await;

        client.close(Some("bye")).unwrap();
        assert_eq!(server.expect().await, "QUIT :bye");
        assert_eq!(client.state(), State::Closing);

        server.say("ERROR :Closing Link").await;
        wait_for(&client, State::Closed).await;
    }

    #[tokio::test]
    async fn lost_connection_reconnects() {
        let (mut client, listener) = setup().await;
        let server = registered(&client, &listener).await;
        drop(server);

        let mut again = Server::accept(&listener).await;
        again.say(":srv NOTICE * :hello again").await;
        assert_eq!(again.expect().await, "NICK me");

        let texts: Vec<String> = client
            .drain()
            .filter(|m| m.kind == Kind::System)
            .filter_map(|m| m.trailing().map(str::to_string))
            .collect();
        assert!(texts.iter().any(|t| t.starts_with("Connection lost")));
    }

    #[tokio::test]
    async fn connect_failure_leaves_client_closed() {
        let (mut client, listener) = setup().await;
        drop(listener);

        assert!(matches!(
            client.connect().await,
            Err(ClientError::Connect { .. })
        ));
        assert_eq!(client.state(), State::Closed);
        let msg = client.drain().next().expect("system message");
        assert_eq!(msg.kind, Kind::System);
    }

    #[tokio::test]
    async fn keepalive_pings_while_connected() {
        let (client, listener) = setup_with(ClientConfig {
            keepalive_secs: 1,
            read_timeout_secs: 1,
            ..ClientConfig::default()
        })
        .await;
        let mut server = registered(&client, &listener).await;

        let line = server.expect().await;
        let stamp = line.strip_prefix("PING :").expect("keepalive PING");
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn failure_while_closing_does_not_reconnect() {
        let (client, listener) = setup().await;
        let mut server = registered(&client, &listener).await;

        client.close(None).unwrap();
        assert_eq!(server.expect().await, "QUIT");
        drop(server);

        wait_for(&client, State::Closed).await;
        let reconnected = time::timeout(Duration::from_millis(500), listener.accept()).await;
        assert!(reconnected.is_err());
        assert_eq!(client.state(), State::Closed);
    }
}
