pub mod model;
pub mod nickname;

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use std::path::{Path, PathBuf};

pub use model::{AppConfig, ClientConfig, DccConfig, LoggingConfig, ServerConfig, UiConfig};

const CONFIG_ENV: &str = "IRCLOOP_CONFIG";

fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ircloop")
        .join("config.toml")
}

/// Load the configuration, falling back to defaults when no file exists.
/// Paths are returned with `~` expanded and an empty nickname replaced.
pub fn load_config() -> Result<AppConfig> {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    let config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        AppConfig::default()
    };
    Ok(resolve(config))
}

fn resolve(mut config: AppConfig) -> AppConfig {
    if config.server.nickname.trim().is_empty() {
        config.server.nickname = nickname::generate_nickname();
    }
    config.dcc.download_dir = expand_home(&config.dcc.download_dir);
    config.logging.log_dir = expand_home(&config.logging.log_dir);
    config.logging.trace_file = expand_home(&config.logging.trace_file);
    if !is_valid_strftime(&config.ui.timestamp_format) {
        // Tracing is not set up yet, so this goes to stderr.
        eprintln!(
            "Ignoring invalid timestamp_format {:?}",
            config.ui.timestamp_format
        );
        config.ui.timestamp_format = UiConfig::default().timestamp_format;
    }
    config
}

/// A format chrono would refuse to render at display time.
fn is_valid_strftime(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
