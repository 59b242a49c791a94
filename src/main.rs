//! opcua-lite: a minimal OPC UA server.
//!
//! Loads configuration, installs the stop-signal latch, creates the server
//! and drives it until SIGINT or SIGTERM.

use std::path::PathBuf;

use clap::Parser;

use opcua_lite::config::validation::validate_config;
use opcua_lite::config::{load_config, ConfigError};
use opcua_lite::lifecycle::{self, RunningFlag, SignalLatch};
use opcua_lite::observability::{logging, metrics};
use opcua_lite::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "opcua-lite")]
#[command(about = "Minimal OPC UA server", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("opcua-lite v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_file = ?cli.config,
        endpoints = ?config.server.endpoints,
        max_connections = config.limits.max_connections,
        max_wait_ms = config.scheduler.max_wait_ms,
        "Configuration loaded"
    );

    if cli.dry_run {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let flag = RunningFlag::new();
    let _latch = SignalLatch::install(&flag)?;

    let runner = config.runner.clone();
    let mut server = Server::new(config);
    server.create().await?;

    println!("Starting minimal OPC UA server. Press Ctrl+C to stop.");
    let outcome = lifecycle::run(&mut server, &flag, &runner).await;
    if !flag.is_running() {
        println!("Ctrl+C detected, stopping server...");
    }
    println!("Server stopped.");

    let summary = outcome?;
    tracing::info!(
        iterations = summary.iterations,
        io_errors = summary.io_errors,
        "Shutdown complete"
    );
    Ok(())
}
