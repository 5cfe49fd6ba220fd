//! edge-shield: edge node with an admission shield and response cache.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ shield (AdmissionGate)
//!                                        │ allow        │ challenge / deny
//!                                        ▼              ▼
//!                                     pipeline       403 rendered
//!                                        │
//!                          hotlink ──▶ cache ──▶ origin selector ──▶ Origin
//!                                                      ▲
//!     Background:  health monitor ─────────────────────┘
//!                  sweeper (shield + cache expiry)
//!                  config watcher (hot reload)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_shield::config::loader::load_config;
use edge_shield::config::watcher::ConfigWatcher;
use edge_shield::lifecycle::signals::wait_for_signal;
use edge_shield::observability::{logging, metrics};
use edge_shield::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-shield")]
#[command(about = "Edge node with admission shield, response cache, and origin failover", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "edge-shield.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-shield starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        origins = config.origins.len(),
        shield_enabled = config.shield.enabled,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let _watch_handle = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => tracing::info!(signal, "Termination signal received"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        }
        trigger.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
