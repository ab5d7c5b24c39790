//! WebSocket types and configuration

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Normal closure; never retried
pub const NORMAL_CLOSURE: u16 = 1000;
/// Synthesized when the transport drops without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code used by `disconnect`; never retried
pub const CLIENT_DISCONNECT: u16 = 4000;
/// Close code used when the opening handshake misses its deadline
pub const OPEN_TIMEOUT: u16 = 4008;

/// Connection manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Reconnections scheduled before giving up
    pub max_reconnect_attempts: u32,
    /// Base unit of the exponential backoff
    pub reconnect_delay_base: Duration,
    /// Upper bound on any single reconnection delay
    pub max_reconnect_delay: Duration,
    /// Deadline for the opening handshake
    pub open_timeout: Duration,
    /// Running behind a secure origin: `ws://` is upgraded to `wss://`
    pub secure_context: bool,
    /// Accept `ws://` for loopback hosts during local development
    pub allow_insecure_localhost: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay_base: Duration::from_millis(3000),
            max_reconnect_delay: Duration::from_millis(30_000),
            open_timeout: Duration::from_secs(10),
            secure_context: false,
            allow_insecure_localhost: false,
        }
    }
}

impl ManagerConfig {
    /// Set maximum reconnection attempts
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    /// Set the backoff base delay
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.reconnect_delay_base = d;
        self
    }

    /// Set maximum reconnection delay
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_reconnect_delay = d;
        self
    }

    /// Set the opening handshake deadline
    pub fn open_timeout(mut self, d: Duration) -> Self {
        self.open_timeout = d;
        self
    }

    pub fn secure_context(mut self, secure: bool) -> Self {
        self.secure_context = secure;
        self
    }

    pub fn allow_insecure_localhost(mut self, allow: bool) -> Self {
        self.allow_insecure_localhost = allow;
        self
    }
}

/// Keepalive interval used when none (or zero) is given
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(30_000);

/// Per-connection options passed to `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Send application-level keepalive pings while open
    pub enable_ping: bool,
    /// Interval between keepalive pings
    pub ping_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            enable_ping: true,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

impl ConnectOptions {
    pub fn enable_ping(mut self, enabled: bool) -> Self {
        self.enable_ping = enabled;
        self
    }

    /// Set ping interval; zero falls back to the default
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = if d.is_zero() { DEFAULT_PING_INTERVAL } else { d };
        self
    }
}

/// Lifecycle of a live transport handle. A closed transport is dropped, so
/// `ConnectionManager::ready_state` reports `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
}

/// Close code and reason reported by (or sent to) a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Frame sent by `disconnect`
    pub fn client_disconnect() -> Self {
        Self::new(CLIENT_DISCONNECT, "Client initiated disconnect")
    }

    /// Frame sent when the opening handshake times out
    pub fn open_timeout() -> Self {
        Self::new(OPEN_TIMEOUT, "Connection timeout")
    }

    /// Frame reported when the connection drops without a close handshake
    pub fn abnormal() -> Self {
        Self::new(ABNORMAL_CLOSURE, "")
    }

    /// Whether a close with this code should start the retry policy
    pub fn triggers_reconnect(&self) -> bool {
        !matches!(self.code, NORMAL_CLOSURE | CLIENT_DISCONNECT)
    }
}

/// Event kinds listeners can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Close,
    Error,
    MaxReconnectAttemptsReached,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Open,
        EventKind::Message,
        EventKind::Close,
        EventKind::Error,
        EventKind::MaxReconnectAttemptsReached,
    ];

    /// Wire-style event name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Message => "message",
            EventKind::Close => "close",
            EventKind::Error => "error",
            EventKind::MaxReconnectAttemptsReached => "maxReconnectAttemptsReached",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| WsError::UnknownEvent(s.to_string()))
    }
}

/// Payload of an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// Text frame that parsed as JSON
    Json(Value),
    /// Text frame that did not parse, unchanged
    Raw(String),
    /// Binary frame, unchanged
    Binary(Vec<u8>),
}

impl MessagePayload {
    /// Decode a text frame, falling back to the raw text
    pub fn decode(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => MessagePayload::Json(value),
            Err(_) => MessagePayload::Raw(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            MessagePayload::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Events delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open,
    Message(MessagePayload),
    Close(CloseFrame),
    Error(WsError),
    MaxReconnectAttemptsReached { attempts: u32 },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Open => EventKind::Open,
            Event::Message(_) => EventKind::Message,
            Event::Close(_) => EventKind::Close,
            Event::Error(_) => EventKind::Error,
            Event::MaxReconnectAttemptsReached { .. } => EventKind::MaxReconnectAttemptsReached,
        }
    }
}

/// Outgoing application data
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Sent verbatim
    Text(String),
    /// Serialized to JSON text before sending
    Json(Value),
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Outgoing::Text(text.to_string())
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Outgoing::Text(text)
    }
}

impl From<Value> for Outgoing {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Outgoing::Text(text),
            other => Outgoing::Json(other),
        }
    }
}

/// Application-level keepalive frame
#[derive(Debug, Clone, serde::Serialize)]
pub struct PingFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PingFrame {
    pub fn now() -> Self {
        Self {
            kind: "ping",
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// WebSocket errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WsError {
    /// URL failed validation; no transport was created
    #[error("Invalid WebSocket URL format: {reason} ({url})")]
    InvalidUrl { url: String, reason: String },
    /// Opening handshake missed its deadline
    #[error("Connection timeout after {0:?}")]
    ConnectTimeout(Duration),
    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// No open transport
    #[error("WebSocket not connected, cannot send message")]
    NotConnected,
    /// Payload could not be serialized
    #[error("Serialization failed: {0}")]
    Serialize(String),
    /// Transport task stopped accepting frames
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// Event name outside the known set
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}
