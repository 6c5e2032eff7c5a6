//! Configuration for checkbox-sync
//!
//! Centralized configuration with sensible defaults. Can be built in code
//! through [`ConfigBuilder`] or loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::bitmap::Geometry;
use crate::error::{Result, SyncError};
use crate::protocol::PROTOCOL_VERSION_MAJOR;

/// Main configuration for a sync client
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// WebSocket URL of the authority
    pub server_url: String,

    /// Fixed delay between a close and the next connection attempt (milliseconds)
    pub reconnect_delay_ms: u64,

    /// Limit on TCP connect plus WebSocket upgrade (milliseconds)
    pub connect_timeout_ms: u64,

    /// Silence after which the authority is pinged; a second silent
    /// interval ends the connection (milliseconds)
    pub idle_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Chunk selected when the session starts
    pub initial_chunk_index: u32,

    /// Partitioning of the global bit space
    pub geometry: Geometry,

    /// Protocol major version this client speaks
    pub protocol_version_major: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:2253".to_string(),
            reconnect_delay_ms: 1000,
            connect_timeout_ms: 10_000,
            idle_timeout_ms: 30_000,
            initial_chunk_index: 0,
            geometry: Geometry::default(),
            protocol_version_major: PROTOCOL_VERSION_MAJOR,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse a config from TOML text. Missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reconnect delay as a Duration
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Check that the values are usable together
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;

        if self.connect_timeout_ms == 0 || self.idle_timeout_ms == 0 {
            return Err(SyncError::Config(
                "connect_timeout_ms and idle_timeout_ms must be non-zero".to_string(),
            ));
        }

        if self.initial_chunk_index >= self.geometry.chunk_count {
            return Err(SyncError::Config(format!(
                "initial_chunk_index {} out of range (chunk count {})",
                self.initial_chunk_index, self.geometry.chunk_count
            )));
        }

        if self.server_url.is_empty() {
            return Err(SyncError::Config("server_url is empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the authority WebSocket URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Set the reconnect delay (in milliseconds)
    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the idle timeout (in milliseconds)
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    /// Set the chunk selected at startup
    pub fn initial_chunk_index(mut self, index: u32) -> Self {
        self.config.initial_chunk_index = index;
        self
    }

    /// Set the bit space partitioning
    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.config.geometry = geometry;
        self
    }

    /// Set the protocol major version
    pub fn protocol_version_major(mut self, major: u16) -> Self {
        self.config.protocol_version_major = major;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
