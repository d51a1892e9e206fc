//! Configuration types and loading.
//!
//! Config is loaded from a YAML file (e.g. `~/.relaybot/config.yaml`).
//! Secrets (Telegram token, HTTP auth token) may be overridden from the
//! environment. The command table is read-only after load and shared across
//! all poller and HTTP-handler tasks.

use crate::command::CommandDefinition;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Messaging provider: "signal", "telegram", or empty for HTTP-only.
    #[serde(default)]
    pub provider: String,

    /// Command table: name -> definition. Immutable after load.
    #[serde(default)]
    pub commands: HashMap<String, CommandDefinition>,

    #[serde(default)]
    pub signal: SignalConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub httpd: HttpdConfig,
}

/// Signal connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalConfig {
    /// Path to the signal-cli JSON-RPC unix socket.
    #[serde(default)]
    pub socket: PathBuf,
    /// Sender numbers allowed to issue commands; messages from anyone else
    /// are dropped with a warning.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_APITOKEN env when set.
    pub api_token: Option<String>,
    /// Log raw updates at debug level.
    #[serde(default)]
    pub debug: bool,
}

/// HTTP command endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpdConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Bind address (default "127.0.0.1:8080").
    #[serde(default = "default_httpd_addr")]
    pub addr: String,

    /// Shared token required as `Authorization: Token <value>` on /cmd
    /// requests. Overridden by HTTP_TOKEN_AUTH env when set; empty disables
    /// the check.
    pub auth_token: Option<String>,
}

fn default_httpd_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for HttpdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_httpd_addr(),
            auth_token: None,
        }
    }
}

/// Env-first secret resolution: a non-empty env var wins over the config
/// value; both empty means None.
fn resolve_secret(env_var: &str, config_value: Option<&str>) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the Telegram bot token: env TELEGRAM_APITOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    resolve_secret("TELEGRAM_APITOKEN", config.telegram.api_token.as_deref())
}

/// Resolve the HTTP auth token: env HTTP_TOKEN_AUTH overrides config.
/// None disables the auth gate entirely.
pub fn resolve_http_auth_token(config: &Config) -> Option<String> {
    resolve_secret("HTTP_TOKEN_AUTH", config.httpd.auth_token.as_deref())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAYBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relaybot").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("config.yaml"))
        })
}

/// Load config from the given path (or RELAYBOT_CONFIG_PATH / the default).
/// A missing or unreadable file is an error; there is no default command
/// table. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let config = serde_yaml::from_str(&s)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    Ok((config, path))
}
