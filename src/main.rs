//! dbgate server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use dbgate::config::loader;
use dbgate::lifecycle::startup;
use dbgate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "dbgate")]
#[command(about = "Datastore connection gateway", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults and DBGATE_* variables apply without one.
    #[arg(short, long, env = "DBGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = loader::load(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dbgate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        datastore = %config.datastore.address,
        connect_timeout_ms = config.datastore.connect_timeout_ms,
        request_timeout_ms = config.gate.request_timeout_ms,
        failure_threshold = config.circuit_breaker.failure_threshold,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    if let Err(e) = startup::run(config).await {
        tracing::error!(error = %format!("{e:#}"), "dbgate exiting");
        return Err(e);
    }
    Ok(())
}
