//! pollsock - Polling TCP server
//!
//! Accepts TCP connections and logs raw byte arrivals and disconnections.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pollsock::config::ConfigManager;
use pollsock::metrics::{MetricsServer, ServerMetrics};
use pollsock::{LoggingObserver, Server, ShutdownCoordinator};

/// CLI arguments for pollsock
#[derive(Parser, Debug)]
#[command(name = "pollsock")]
#[command(about = "pollsock - Polling TCP server surfacing raw connection events")]
#[command(version)]
#[command(long_about = "
pollsock - Polling TCP server surfacing raw connection events

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  POLLSOCK_PORT             - Port bound on 0.0.0.0 (0 = ephemeral)
  POLLSOCK_POLL_INTERVAL    - Pause between supervisor passes (e.g., 20ms)
  POLLSOCK_STOP_TIMEOUT     - Bound on waiting for the loop at stop (e.g., 5s)
  POLLSOCK_READ_BUFFER_SIZE - Largest payload drained per connection per pass
  POLLSOCK_CLOSE_ON_STOP    - Close live connections on stop (true/false)
  POLLSOCK_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "pollsock.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to on 0.0.0.0")]
    pub port: Option<u16>,

    /// Polling interval (overrides config file)
    #[arg(long, value_parser = humantime::parse_duration, help = "Polling interval (e.g., 20ms)")]
    pub poll_interval: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Close live connections when stopping
    #[arg(long, help = "Close live connections on shutdown")]
    pub close_on_stop: bool,

    /// Prometheus scrape endpoint (overrides config file)
    #[arg(long, help = "Metrics endpoint address (e.g., 127.0.0.1:9100)")]
    pub metrics_addr: Option<SocketAddr>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.port,
        args.poll_interval,
        args.close_on_stop,
        args.metrics_addr,
    );
    if let Some(level) = &args.log_level {
        config.monitoring.log_level = level.clone();
    }

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config.monitoring.log_level)?;

    info!("Starting pollsock v{}", env!("CARGO_PKG_VERSION"));

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Port: {}", config.server.port);
        info!("  Poll interval: {:?}", config.server.poll_interval);
        info!("  Stop timeout: {:?}", config.server.stop_timeout);
        info!("  Read buffer size: {} bytes", config.server.read_buffer_size);
        info!("  Close on stop: {}", config.server.close_on_stop);
        info!(
            "  Metrics: {}",
            if config.monitoring.metrics_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    let mut server = Server::new(config.server.clone());
    server.subscribe(Arc::new(LoggingObserver::new().with_pass_logging()));

    let metrics_handle = if config.monitoring.metrics_enabled {
        let metrics = Arc::new(ServerMetrics::new().context("Failed to create metrics")?);
        server.subscribe(metrics.clone());

        match config.monitoring.metrics_addr {
            Some(addr) => {
                let metrics_server = MetricsServer::bind(metrics, addr)
                    .await
                    .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;
                Some(tokio::spawn(async move {
                    if let Err(e) = metrics_server.run().await {
                        error!("Metrics server error: {}", e);
                    }
                }))
            }
            None => None,
        }
    } else {
        info!("Metrics disabled");
        None
    };

    server
        .start(config.server.port)
        .await
        .with_context(|| format!("Failed to start server on port {}", config.server.port))?;

    if let Some(addr) = server.local_addr() {
        info!("pollsock listening on {}", addr);
    }
    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    // The coordinator bound covers the supervisor's own stop timeout
    let shutdown_coordinator =
        ShutdownCoordinator::new(config.server.stop_timeout + Duration::from_secs(1));

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
    }

    info!("Initiating graceful shutdown...");
    shutdown_coordinator.shutdown_server(&mut server).await?;

    if let Some(handle) = metrics_handle {
        handle.abort();
        info!("Metrics server shutdown");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, configured_level: &str) -> Result<()> {
    let log_level = if args.verbose { "debug" } else { configured_level };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
