// src/config.rs

//! Manages broker configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

/// Configuration for the per-connection handle tables.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HandleConfig {
    /// The maximum number of virtual handles a single connection may hold.
    #[serde(default = "default_handle_max_entries")]
    pub max_entries: usize,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            max_entries: default_handle_max_entries(),
        }
    }
}

fn default_handle_max_entries() -> usize {
    256
}

/// The broker's runtime configuration, loaded from a TOML file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Path of the Unix domain socket the control listener binds to.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// The maximum number of concurrently registered connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// The size of the request buffer for each connection. A single client
    /// request must fit in one buffer.
    #[serde(default = "default_request_buffer_bytes")]
    pub request_buffer_bytes: usize,
    #[serde(default)]
    pub handles: HandleConfig,
}

fn default_socket_path() -> String {
    "/run/secmux/secmux.sock".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_connections() -> usize {
    64
}
fn default_request_buffer_bytes() -> usize {
    4096
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: default_log_level(),
            max_connections: default_max_connections(),
            request_buffer_bytes: default_request_buffer_bytes(),
            handles: HandleConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.trim().is_empty() {
            return Err(anyhow!("socket_path cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections cannot be 0"));
        }
        if self.handles.max_entries == 0 {
            return Err(anyhow!("handles.max_entries cannot be 0"));
        }
        if self.request_buffer_bytes < 16 {
            return Err(anyhow!(
                "request_buffer_bytes must be at least 16, got {}",
                self.request_buffer_bytes
            ));
        }

        if self.request_buffer_bytes < 1024 {
            warn!(
                "low request_buffer_bytes setting: {} bytes. Requests larger than the buffer are rejected.",
                self.request_buffer_bytes
            );
        }

        Ok(())
    }
}
