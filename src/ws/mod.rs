//! WebSocket connection manager
//!
//! Owns one logical WebSocket connection at a time with automatic
//! reconnection (capped exponential backoff), an optional keepalive ping,
//! and fan-out of connection events to registered listeners.

mod backoff;
mod endpoint;
mod listeners;
mod manager;
mod transport;
mod types;

pub use backoff::reconnect_delay;
pub use endpoint::normalize as normalize_url;
pub use listeners::{Listener, ListenerRegistry};
pub use manager::ConnectionManager;
pub use transport::{
    Connector, Outbound, TransportEnd, TransportEvent, TransportLink, TungsteniteConnector,
};
pub use types::{
    CloseFrame, ConnectOptions, Event, EventKind, ManagerConfig, MessagePayload, Outgoing,
    PingFrame, ReadyState, WsError, ABNORMAL_CLOSURE, CLIENT_DISCONNECT, DEFAULT_PING_INTERVAL,
    NORMAL_CLOSURE, OPEN_TIMEOUT,
};
