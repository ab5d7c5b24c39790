//! Send command implementation

use super::{describe_payload, resolve_url, subscribe_all};
use crate::config::Config;
use crate::ws::{ConnectionManager, Event, Outgoing};
use clap::Args;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Message to send
    pub message: String,

    /// WebSocket URL (defaults to connection.url)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Parse the message as JSON before sending
    #[arg(long)]
    pub json: bool,

    /// How long to print replies after sending
    #[arg(long, default_value_t = 2000)]
    pub wait_ms: u64,
}

impl SendArgs {
    fn outgoing(&self) -> anyhow::Result<Outgoing> {
        if self.json {
            let value: serde_json::Value = serde_json::from_str(&self.message)?;
            Ok(value.into())
        } else {
            Ok(Outgoing::Text(self.message.clone()))
        }
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let url = resolve_url(self.url.as_deref(), config)?;
        let outgoing = self.outgoing()?;

        let manager = ConnectionManager::new(config.connection.manager_config());
        let mut events = subscribe_all(&manager);
        manager.connect(&url, config.ping.connect_options())?;

        // Wait for the connection, tolerating reconnects
        loop {
            match events.recv().await {
                Some(Event::Open) => break,
                Some(Event::Error(e)) => tracing::warn!(error = %e, "Connection error"),
                Some(Event::MaxReconnectAttemptsReached { attempts }) => {
                    anyhow::bail!("Could not connect after {} reconnect attempts", attempts);
                }
                Some(_) => {}
                None => anyhow::bail!("Connection manager stopped"),
            }
        }

        manager.send(outgoing)?;

        let deadline = Instant::now() + Duration::from_millis(self.wait_ms);
        while let Ok(Some(event)) = timeout_at(deadline, events.recv()).await {
            match event {
                Event::Message(payload) => println!("{}", describe_payload(&payload)),
                Event::Close(frame) => {
                    tracing::info!(code = frame.code, "Server closed the connection");
                    break;
                }
                _ => {}
            }
        }

        manager.disconnect();
        Ok(())
    }
}
