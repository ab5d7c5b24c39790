//! Configuration types for mindful-ws

use crate::telemetry::LogFormat;
use crate::ws::{ConnectOptions, ManagerConfig};
use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub ping: PingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Connection and reconnection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Default endpoint for CLI commands
    #[serde(default)]
    pub url: Option<String>,

    /// Reconnections scheduled before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base unit of the exponential backoff (milliseconds)
    #[serde(default = "default_reconnect_delay_base_ms")]
    pub reconnect_delay_base_ms: u64,

    /// Cap on a single reconnection delay (milliseconds)
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Opening handshake deadline (milliseconds)
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Upgrade `ws://` to `wss://`, as a page served over HTTPS would
    #[serde(default)]
    pub secure_context: bool,

    /// Accept `ws://` to loopback hosts
    #[serde(default)]
    pub allow_insecure_localhost: bool,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay_base_ms() -> u64 {
    3000
}
fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}
fn default_open_timeout_ms() -> u64 {
    10_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_reconnect_attempts: 5,
            reconnect_delay_base_ms: 3000,
            max_reconnect_delay_ms: 30_000,
            open_timeout_ms: 10_000,
            secure_context: false,
            allow_insecure_localhost: false,
        }
    }
}

impl ConnectionConfig {
    /// Manager settings for this configuration
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::default()
            .max_reconnects(self.max_reconnect_attempts)
            .base_delay(Duration::from_millis(self.reconnect_delay_base_ms))
            .max_delay(Duration::from_millis(self.max_reconnect_delay_ms))
            .open_timeout(Duration::from_millis(self.open_timeout_ms))
            .secure_context(self.secure_context)
            .allow_insecure_localhost(self.allow_insecure_localhost)
    }
}

/// Keepalive configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between keepalive frames (milliseconds)
    #[serde(default = "default_ping_interval_ms")]
    pub interval_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_ping_interval_ms() -> u64 {
    30_000
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
        }
    }
}

impl PingConfig {
    /// Per-connection options for this configuration
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::default()
            .enable_ping(self.enabled)
            .ping_interval(Duration::from_millis(self.interval_ms))
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
