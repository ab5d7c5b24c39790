//! CLI interface for mindful-ws
//!
//! Provides subcommands for:
//! - `listen`: Connect and log every connection event
//! - `send`: Send one message and print the replies
//! - `config`: Show the effective configuration

mod listen;
mod send;

pub use listen::ListenArgs;
pub use send::SendArgs;

use crate::config::Config;
use crate::ws::{ConnectionManager, Event, EventKind, MessagePayload};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "mindful-ws")]
#[command(about = "Reconnecting WebSocket client for the Mindful Creator backend")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and log events until interrupted
    Listen(ListenArgs),
    /// Send one message and print the replies
    Send(SendArgs),
    /// Show the effective configuration
    Config,
}

/// Pick the URL from the command line, falling back to the config file
fn resolve_url(arg: Option<&str>, config: &Config) -> anyhow::Result<String> {
    arg.map(str::to_string)
        .or_else(|| config.connection.url.clone())
        .ok_or_else(|| anyhow::anyhow!("No URL given: pass --url or set connection.url"))
}

/// Forward every manager event into a channel the command can await
fn subscribe_all(manager: &ConnectionManager) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in EventKind::ALL {
        let tx = tx.clone();
        manager.on(
            kind,
            Arc::new(move |event: &Event| {
                let _ = tx.send(event.clone());
            }),
        );
    }
    rx
}

fn describe_payload(payload: &MessagePayload) -> String {
    match payload {
        MessagePayload::Json(value) => value.to_string(),
        MessagePayload::Raw(text) => text.clone(),
        MessagePayload::Binary(data) => format!("<{} bytes>", data.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_url_prefers_argument() {
        let mut config = Config::default();
        config.connection.url = Some("wss://from-config/ws".to_string());

        assert_eq!(
            resolve_url(Some("wss://from-arg/ws"), &config).unwrap(),
            "wss://from-arg/ws"
        );
        assert_eq!(resolve_url(None, &config).unwrap(), "wss://from-config/ws");
    }

    #[test]
    fn test_resolve_url_missing() {
        assert!(resolve_url(None, &Config::default()).is_err());
    }

    #[test]
    fn test_describe_payload() {
        assert_eq!(
            describe_payload(&MessagePayload::Json(json!({"type": "pong"}))),
            r#"{"type":"pong"}"#
        );
        assert_eq!(describe_payload(&MessagePayload::Raw("hi".to_string())), "hi");
        assert_eq!(describe_payload(&MessagePayload::Binary(vec![0; 3])), "<3 bytes>");
    }

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::parse_from(["mindful-ws", "send", "--json", r#"{"type":"hello"}"#]);
        match cli.command {
            Commands::Send(args) => {
                assert!(args.json);
                assert_eq!(args.message, r#"{"type":"hello"}"#);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, "config.toml");
    }
}
