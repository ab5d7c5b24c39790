//! Listen command implementation

use super::{describe_payload, resolve_url, subscribe_all};
use crate::config::Config;
use crate::ws::{ConnectionManager, Event};
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// WebSocket URL (defaults to connection.url)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Disable the keepalive ping
    #[arg(long)]
    pub no_ping: bool,

    /// Override the keepalive interval
    #[arg(long)]
    pub ping_interval_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

impl ListenArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let url = resolve_url(self.url.as_deref(), config)?;

        let mut options = config.ping.connect_options();
        if self.no_ping {
            options = options.enable_ping(false);
        }
        if let Some(ms) = self.ping_interval_ms {
            options = options.ping_interval(Duration::from_millis(ms));
        }

        let manager = ConnectionManager::new(config.connection.manager_config());
        let mut events = subscribe_all(&manager);
        manager.connect(&url, options)?;

        let deadline = async {
            match self.duration_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Event::Open => println!("connected to {}", url),
                        Event::Message(payload) => println!("< {}", describe_payload(&payload)),
                        Event::Close(frame) => println!("closed: {} {}", frame.code, frame.reason),
                        Event::Error(e) => eprintln!("error: {}", e),
                        Event::MaxReconnectAttemptsReached { attempts } => {
                            eprintln!("giving up after {} reconnect attempts", attempts);
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    tracing::info!("Listen duration elapsed");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                    break;
                }
            }
        }

        manager.disconnect();
        Ok(())
    }
}
