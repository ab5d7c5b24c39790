use clap::Parser;
use mindful_ws::cli::{Cli, Commands};
use mindful_ws::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).unwrap_or_default()
    });

    // Initialize telemetry
    mindful_ws::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Listen(args) => {
            tracing::info!("Starting listener");
            args.execute(&config).await?;
        }
        Commands::Send(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  URL: {}",
                config.connection.url.as_deref().unwrap_or("<not set>")
            );
            println!(
                "  Reconnect: max={}, base={}ms, cap={}ms",
                config.connection.max_reconnect_attempts,
                config.connection.reconnect_delay_base_ms,
                config.connection.max_reconnect_delay_ms
            );
            println!("  Open timeout: {}ms", config.connection.open_timeout_ms);
            println!(
                "  Secure context: {}, insecure localhost: {}",
                config.connection.secure_context, config.connection.allow_insecure_localhost
            );
            println!(
                "  Ping: enabled={}, interval={}ms",
                config.ping.enabled, config.ping.interval_ms
            );
            println!(
                "  Telemetry: level={}, format={:?}, metrics_port={:?}",
                config.telemetry.log_level,
                config.telemetry.log_format,
                config.telemetry.metrics_port
            );
        }
    }

    Ok(())
}
