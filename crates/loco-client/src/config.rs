//! Client configuration.
//!
//! Loaded from a TOML file when present; every field has a default so a
//! missing or partial file still yields a usable configuration. The device
//! uuid default is freshly generated, so persisting the loaded config is
//! what makes an installation stable across restarts.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5228
}

fn default_device_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_client_name() -> String {
    "loco-client".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Chat server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Chat server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Stable identifier for this installation, sent with every login.
    #[serde(default = "default_device_uuid")]
    pub device_uuid: String,

    /// Human-readable device name shown in the account's session list.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// How long to wait for the handshake response before giving up.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: default_host(),
            port: default_port(),
            device_uuid: default_device_uuid(),
            client_name: default_client_name(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl ClientConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<ClientConfig, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file, falling back to defaults if the file
    /// does not exist. A file that exists but fails to parse is an error.
    pub fn load(path: &Path) -> Result<ClientConfig, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(ClientConfig::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = ClientConfig::from_toml_str(&text)?;
        info!(path = %path.display(), host = %config.host, port = config.port, "loaded config");
        Ok(config)
    }

    /// The `host:port` string used to open the chat connection.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
