//! # Edge Gateway
//!
//! Routes `/api/<service>/*` to backend services with per-service circuit
//! breakers, bounded retries and response caching.
//!
//! ## Usage
//!
//! ```bash
//! # Start with built-in defaults
//! edge-gateway
//!
//! # Start with a config file
//! edge-gateway --config /path/to/gateway.yaml
//!
//! # Start with environment overrides
//! GATEWAY_PORT=9000 REDIS_URL=redis://localhost:6379 edge-gateway
//! ```

use anyhow::Context;
use clap::Parser;
use gateway_config::{load_config, LogFormat};
use gateway_server::{AppState, Server};
use gateway_telemetry::{init_logging, LogOutput, LoggingConfig};
use std::path::PathBuf;
use tracing::info;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "edge-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;

    let output = match config.telemetry.log_format {
        LogFormat::Pretty => LogOutput::Pretty,
        LogFormat::Json => LogOutput::Json,
    };
    init_logging(
        &LoggingConfig::new()
            .with_level(&config.telemetry.log_level)
            .with_output(output),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        services = config.services.len(),
        "Starting edge gateway"
    );

    let state = AppState::builder()
        .config(config)
        .build()
        .context("failed to build application state")?;

    if let Some(cache) = &state.cache {
        cache.check_health().await;
    }
    let background = state.spawn_background_tasks();

    let result = Server::new(state).run().await;

    for task in background {
        task.abort();
    }
    result.context("server failed")
}
