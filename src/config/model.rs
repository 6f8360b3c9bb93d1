//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a default so an empty or missing file works out of the box.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub dcc: DccConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The one IRC server we talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Empty means "pick a guest nick at startup".
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            nickname: String::new(),
            password: None,
        }
    }
}

/// Connection behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Sent in reply to CTCP VERSION.
    #[serde(default = "default_version_string")]
    pub version_string: String,
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive(),
            read_timeout_secs: default_read_timeout(),
            version_string: default_version_string(),
            quit_message: default_quit_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default = "default_max_scrollback")]
    pub max_scrollback: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            timestamp_format: default_timestamp_format(),
            max_scrollback: default_max_scrollback(),
        }
    }
}

/// DCC file transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DccConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Bytes per flush and acknowledgment.
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    /// Minimum fraction between two progress updates.
    #[serde(default = "default_progress_step")]
    pub progress_step: f64,
    #[serde(default = "default_dcc_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_dcc_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_file_size: u64,
    #[serde(default)]
    pub reject_private_ips: bool,
}

impl Default for DccConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            packet_size: default_packet_size(),
            progress_step: default_progress_step(),
            read_timeout_secs: default_dcc_read_timeout(),
            connect_timeout_secs: default_dcc_connect_timeout(),
            max_file_size: 0,
            reject_private_ips: false,
        }
    }
}

/// Chat transcripts and the diagnostic trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_true")]
    pub log_channels: bool,
    #[serde(default)]
    pub log_queries: bool,
    #[serde(default = "default_trace_file")]
    pub trace_file: PathBuf,
    #[serde(default = "default_trace_level")]
    pub trace_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            log_channels: true,
            log_queries: false,
            trace_file: default_trace_file(),
            trace_level: default_trace_level(),
        }
    }
}

fn default_host() -> String {
    "irc.libera.chat".to_string()
}
fn default_port() -> u16 {
    6667
}
fn default_true() -> bool {
    true
}
fn default_keepalive() -> u64 {
    60
}
fn default_read_timeout() -> u64 {
    5
}
fn default_version_string() -> String {
    concat!("ircloop ", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_quit_message() -> String {
    "Leaving".to_string()
}
fn default_timestamp_format() -> String {
    "%H:%M".to_string()
}
fn default_max_scrollback() -> usize {
    1000
}
fn default_download_dir() -> PathBuf {
    PathBuf::from("~/downloads/DCC")
}
fn default_packet_size() -> usize {
    1024 * 1024
}
fn default_progress_step() -> f64 {
    0.05
}
fn default_dcc_read_timeout() -> u64 {
    60
}
fn default_dcc_connect_timeout() -> u64 {
    30
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("~/.local/share/ircloop/logs")
}
fn default_trace_file() -> PathBuf {
    PathBuf::from("~/.local/share/ircloop/ircloop.log")
}
fn default_trace_level() -> String {
    "info".to_string()
}
