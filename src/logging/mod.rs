//! Diagnostics and chat transcripts.
//!
//! Diagnostics go through `tracing` to a file, since the terminal belongs to
//! the chat. When enabled, chat messages are also written to daily log files
//! per channel or query, named `<room>_<date>.log` and stored in the
//! configured log directory.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{warn, Level};

use crate::app::display;
use crate::app::state::RoomKey;
use crate::config::LoggingConfig;
use crate::irc::{Kind, Message};

/// Install the global `tracing` subscriber writing to `trace_file`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    if let Some(dir) = config.trace_file.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.trace_file)
        .with_context(|| format!("Failed to open {}", config.trace_file.display()))?;
    let level = Level::from_str(&config.trace_level).unwrap_or(Level::INFO);

    // A subscriber may already be set, e.g. by a test harness.
    let _ = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .try_init();
    Ok(())
}

/// Writes chat messages to per-channel/query daily log files.
///
/// File handles are cached for the lifetime of the logger. A file that
/// cannot be opened is reported once and then skipped.
pub struct ChatLogger {
    enabled: bool,
    log_dir: PathBuf,
    log_channels: bool,
    log_queries: bool,
    file_handles: HashMap<String, Option<File>>,
}

impl ChatLogger {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            log_dir: config.log_dir.clone(),
            log_channels: config.log_channels,
            log_queries: config.log_queries,
            file_handles: HashMap::new(),
        }
    }

    /// Write a message to the appropriate log file. No-op if logging is
    /// disabled or the room type is not configured for logging.
    pub fn log_message(&mut self, key: &RoomKey, title: &str, msg: &Message) {
        if !self.enabled {
            return;
        }
        match key {
            RoomKey::Channel(_) if self.log_channels => {}
            RoomKey::Query(_) if self.log_queries => {}
            _ => return,
        }

        let timestamp = msg.time.format("%H:%M:%S");
        let text = display::strip_formatting(&display::describe(msg));
        let line = match msg.kind {
            Kind::Message => format!("[{timestamp}] <{}> {text}", msg.nick()),
            Kind::Action => format!("[{timestamp}] * {} {text}", msg.nick()),
            Kind::System => format!("[{timestamp}] *** {text}"),
            Kind::Ctcp(_) | Kind::Dcc(_) => format!("[{timestamp}] -{}- {text}", msg.nick()),
        };

        let safe_title: String = title
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        let date = msg.time.format("%Y-%m-%d");
        let filename = format!("{safe_title}_{date}.log");

        let log_dir = &self.log_dir;
        let handle = self.file_handles.entry(filename).or_insert_with_key(|filename| {
            let path = log_dir.join(filename);
            let opened = fs::create_dir_all(log_dir)
                .and_then(|()| OpenOptions::new().create(true).append(true).open(&path));
            match opened {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("Cannot open chat log {}: {e}", path.display());
                    None
                }
            }
        });

        if let Some(file) = handle {
            if let Err(e) = writeln!(file, "{line}") {
                warn!("Chat log write failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> LoggingConfig {
        LoggingConfig {
            enabled: true,
            log_dir: dir.to_path_buf(),
            log_channels: true,
            log_queries: false,
            ..LoggingConfig::default()
        }
    }

    fn read_logs(dir: &std::path::Path) -> Vec<(String, String)> {
        let mut logs: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path();
                let name = path.file_name().unwrap().to_string_lossy().into_owned();
                (name, fs::read_to_string(&path).unwrap())
            })
            .collect();
        logs.sort();
        logs
    }

    #[test]
    fn channel_messages_are_logged_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ChatLogger::new(&config(dir.path()));
        let msg = Message::parse(":alice!u@h PRIVMSG #rust :hello").unwrap();
        let key = RoomKey::for_target("#rust");

        logger.log_message(&key, "#rust", &msg);
        logger.log_message(&key, "#rust", &Message::system("topic changed"));

        let logs = read_logs(dir.path());
        assert_eq!(logs.len(), 1);
        let (name, contents) = &logs[0];
        assert!(name.starts_with("_rust_"));
        assert!(name.ends_with(".log"));
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("<alice> hello"));
        assert!(lines[1].ends_with("*** topic changed"));
    }

    #[test]
    fn queries_and_server_room_follow_the_switches() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ChatLogger::new(&config(dir.path()));
        let msg = Message::parse(":bob!u@h PRIVMSG me :psst").unwrap();

        logger.log_message(&RoomKey::for_target("bob"), "bob", &msg);
        logger.log_message(&RoomKey::Server, "irc.example.org", &msg);
        assert!(read_logs(dir.path()).is_empty());
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.enabled = false;
        let mut logger = ChatLogger::new(&cfg);
        let msg = Message::parse(":alice!u@h PRIVMSG #rust :hello").unwrap();

        logger.log_message(&RoomKey::for_target("#rust"), "#rust", &msg);
        assert!(read_logs(dir.path()).is_empty());
    }
}
