//! greenlight API server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id ─▶ panic recovery ─▶ metrics
//!                          │
//!                          ▼
//!                    rate limiter ─▶ authenticator ─▶ authorization gate
//!                                                          │
//!                                                          ▼
//!     Client Response                                   handler
//!     ◀──────────────────────────────────────────  ┌──────┴───────┐
//!                                                  │ concurrency  │ background
//!                                                  │    guard     │ task runner
//!                                                  └──────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use greenlight::config::validation::validate_config;
use greenlight::config::{load_config, AppConfig, ConfigError};
use greenlight::http::{AppState, HttpServer};
use greenlight::lifecycle::{signals, Shutdown};
use greenlight::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "greenlight")]
#[command(about = "JSON API with rate limiting, token auth and optimistic concurrency", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; defaults are used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured environment name.
    #[arg(short, long)]
    env: Option<String>,

    /// Override the configured bind address.
    #[arg(short, long)]
    addr: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(env) = &cli.env {
        config.environment = env.clone();
    }
    if let Some(addr) = &cli.addr {
        config.listener.bind_address = addr.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "greenlight starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        backend_timeout_secs = config.timeouts.backend_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    signals::forward_to(shutdown.clone());

    let server = HttpServer::new(AppState::in_memory(config));
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
