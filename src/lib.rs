//! mindful-ws: WebSocket connection manager for the Mindful Creator app
//!
//! This library provides:
//! - A connection manager owning one WebSocket at a time
//! - Automatic reconnection with capped exponential backoff
//! - Application-level keepalive pings
//! - Event fan-out to registered listeners
//! - TOML configuration, structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod telemetry;
pub mod ws;
