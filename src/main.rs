mod app;
mod config;
mod dcc;
mod event;
mod input;
mod irc;
mod logging;
mod signals;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app::action::Action;
use crate::app::display;
use crate::app::handler;
use crate::app::state::{AppState, RoomKey};
use crate::config::AppConfig;
use crate::dcc::Engine;
use crate::event::{Handle, Multiplexer, SourceId};
use crate::input::{Input, InputEvent};
use crate::irc::{Client, Message, State};
use crate::logging::ChatLogger;
use crate::signals::Signals;

/// How long a QUIT may wait for the server before the loop stops anyway.
const QUIT_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load_config()?;
    logging::init_tracing(&cfg.logging)?;

    std::fs::create_dir_all(&cfg.dcc.download_dir).with_context(|| {
        format!(
            "Failed to create download directory {}",
            cfg.dcc.download_dir.display()
        )
    })?;

    if let Err(e) = run_app(cfg).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run_app(cfg: AppConfig) -> Result<()> {
    let mut mux = Multiplexer::<App>::new();

    let mut client = Client::new(cfg.server.clone(), cfg.client.clone());
    let mut engine = Engine::new(cfg.dcc.clone());
    let mut signals = Signals::install().context("Failed to install signal handlers")?;
    let mut input = Input::stdin();

    mux.register(client.bell().context("client bell taken")?, App::on_client);
    mux.register(engine.bell().context("DCC bell taken")?, App::on_dcc);
    mux.register(signals.bell().context("signal bell taken")?, App::on_signals);

    let handle = mux.handle();
    let input_source = handle.register(input.bell().context("input bell taken")?, App::on_input);

    engine.start();

    let mut app = App {
        state: AppState::new(&cfg.server.host, &cfg.server.nickname, &cfg.ui),
        client,
        engine,
        signals,
        input,
        logger: ChatLogger::new(&cfg.logging),
        handle,
        input_source: Some(input_source),
        quit_message: cfg.client.quit_message.clone(),
    };

    app.state.system_message(
        0,
        format!(
            "Connecting to {}:{} as {}",
            cfg.server.host, cfg.server.port, cfg.server.nickname
        ),
    );
    app.flush()?;
    if let Err(e) = app.client.connect().await {
        warn!("Initial connect failed: {e}");
    }

    mux.run(&mut app).await.context("Event loop failed")?;

    app.engine.stop();
    info!("Bye");
    Ok(())
}

/// Everything the event handlers touch. Owned by the multiplexer loop.
struct App {
    state: AppState,
    client: Client,
    engine: Engine,
    signals: Signals,
    input: Input,
    logger: ChatLogger,
    handle: Handle<App>,
    input_source: Option<SourceId>,
    quit_message: String,
}

impl App {
    fn on_client(&mut self) -> Result<()> {
        let messages: Vec<Message> = self.client.drain().collect();
        for msg in messages {
            let actions = handler::handle_irc_message(&mut self.state, msg);
            self.perform(actions);
        }
        if self.state.quitting && self.client.state() == State::Closed {
            self.handle.stop();
        }
        self.flush()
    }

    fn on_dcc(&mut self) -> Result<()> {
        let updates: Vec<_> = self.engine.drain().collect();
        for update in updates {
            let actions = handler::handle_dcc_update(&mut self.state, update);
            self.perform(actions);
        }
        self.flush()
    }

    fn on_signals(&mut self) -> Result<()> {
        let received: Vec<_> = self.signals.drain().collect();
        for signal in received {
            let actions = handler::handle_signal(&mut self.state, signal);
            self.perform(actions);
        }
        self.flush()
    }

    fn on_input(&mut self) -> Result<()> {
        let events: Vec<_> = self.input.drain().collect();
        for event in events {
            match event {
                InputEvent::Line(line) => {
                    let actions = handler::handle_input(&mut self.state, &line);
                    self.perform(actions);
                }
                InputEvent::Closed => {
                    if let Some(id) = self.input_source.take() {
                        self.handle.unregister(id);
                    }
                    self.perform(vec![Action::Quit { reason: None }]);
                }
            }
        }
        self.flush()
    }

    fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(line) => {
                    if let Err(e) = self.client.send(&line) {
                        self.notice(format!("Cannot send: {e}"));
                    }
                }
                Action::Connect => {
                    if let Err(e) = self.client.spawn_connect() {
                        self.notice(format!("Cannot connect: {e}"));
                    }
                }
                Action::DccOffer(msg) => {
                    if let Err(e) = self.engine.add(msg) {
                        warn!("DCC offer rejected: {e}");
                        self.notice(format!("DCC offer rejected: {e}"));
                    }
                }
                Action::Quit { reason } => self.quit(reason),
            }
        }
    }

    /// Close the connection and stop once it is closed, or stop right away
    /// when there is nothing to close. A second request stops immediately.
    fn quit(&mut self, reason: Option<String>) {
        if self.state.quitting {
            self.handle.stop();
            return;
        }
        self.state.quitting = true;

        let reason = reason.unwrap_or_else(|| self.quit_message.clone());
        match self.client.close(Some(&reason)) {
            Ok(()) => {
                let handle = self.handle.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(QUIT_GRACE).await;
                    handle.stop();
                });
            }
            Err(_) => self.handle.stop(),
        }
    }

    fn notice(&mut self, text: String) {
        let index = self.state.active_index();
        self.state.system_message(index, text);
    }

    /// Print and log what the handlers appended, then repaint the active
    /// room if it changed.
    fn flush(&mut self) -> Result<()> {
        let mut out = io::stdout().lock();

        for (key, msg) in std::mem::take(&mut self.state.new_messages) {
            let title = self.state.title(&key).unwrap_or_else(|| fallback_title(&key));
            self.logger.log_message(&key, title, &msg);
            writeln!(
                out,
                "{}",
                display::format_line(title, &msg, &self.state.timestamp_format)
            )?;
        }

        if std::mem::take(&mut self.state.redraw) {
            let rooms: Vec<String> = self
                .state
                .rooms()
                .iter()
                .enumerate()
                .map(|(i, room)| {
                    let marker = if room.unread { "*" } else { "" };
                    format!("{i}:{}{marker}", room.title)
                })
                .collect();
            writeln!(out, "-- {} | {}", self.client.nick(), rooms.join(" "))?;

            let room = self.state.active_room();
            for msg in &room.messages {
                writeln!(
                    out,
                    "{}",
                    display::format_line(&room.title, msg, &self.state.timestamp_format)
                )?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

/// Title for a room that was closed before its messages were flushed.
fn fallback_title(key: &RoomKey) -> &str {
    match key {
        RoomKey::Server => "server",
        RoomKey::Channel(name) | RoomKey::Query(name) => name,
    }
}
