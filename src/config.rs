//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity and listen configuration.
    pub server: ServerConfig,
    /// Credential verification configuration.
    pub auth: AuthConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Inbound event limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "quay.example.net").
    pub name: String,
    /// WebSocket listen address.
    pub listen: SocketAddr,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
    /// Allowed Origin headers for the WebSocket handshake.
    /// Empty means all origins are accepted.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

/// Credential verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify bearer tokens. An unset or empty secret
    /// is fatal at startup.
    #[serde(default)]
    pub secret: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "quayd.db".to_string()
}

/// Inbound event limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum message content length in characters. Longer payloads are
    /// dropped without persistence or broadcast.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Outgoing queue depth per connection. A subscriber whose queue is
    /// full has the frame dropped rather than stalling the fan-out.
    #[serde(default = "default_outgoing_queue")]
    pub outgoing_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            outgoing_queue: default_outgoing_queue(),
        }
    }
}

fn default_max_message_length() -> usize {
    2000
}

fn default_outgoing_queue() -> usize {
    64
}
