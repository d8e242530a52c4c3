//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the supervisor for the configured datastore
//! - Establish the first connection before accepting traffic
//! - Start background tasks (idle reaper, signal listener)
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: an unreachable datastore at startup is fatal when eager
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use crate::clock::{SharedClock, SystemClock};
use crate::config::GatewayConfig;
use crate::datastore::{Connector, TcpConnector};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::maintenance::MaintenanceScheduler;
use crate::supervisor::{ConnectionSupervisor, IdleReaper};

/// Run the gateway against a TCP datastore until a shutdown signal.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let clock: SharedClock = Arc::new(SystemClock);
    let connector = TcpConnector::new(config.datastore.address.clone());
    let supervisor = ConnectionSupervisor::new(
        connector,
        &config.datastore,
        &config.circuit_breaker,
        clock,
    );
    let maintenance = MaintenanceScheduler::new(supervisor.clone(), config.maintenance.clone());

    let listener = prepare(&config, &supervisor).await?;
    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    serve(
        config,
        supervisor,
        Some(maintenance),
        Router::new(),
        listener,
        shutdown,
    )
    .await
}

/// Warm up the datastore connection if configured, then bind the listener.
pub async fn prepare<C: Connector>(
    config: &GatewayConfig,
    supervisor: &ConnectionSupervisor<C>,
) -> anyhow::Result<TcpListener> {
    if config.datastore.eager_connect {
        tracing::info!(datastore = %supervisor.target(), "Establishing initial datastore connection");
        supervisor
            .connect()
            .await
            .with_context(|| format!("initial connection to {} failed", supervisor.target()))?;
        tracing::info!(datastore = %supervisor.target(), "Datastore connected");
    }

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.listener.bind_address))?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}

/// Serve until `shutdown` fires, then stop background tasks and close the
/// datastore handle.
pub async fn serve<C: Connector>(
    config: GatewayConfig,
    supervisor: ConnectionSupervisor<C>,
    maintenance: Option<MaintenanceScheduler<C>>,
    routes: Router<AppState<C>>,
    listener: TcpListener,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    // Subscribe before checking the flag so a signal raised in between
    // still reaches both receivers.
    let server_rx = shutdown.subscribe();
    let reaper_rx = match config.datastore.idle_timeout_secs {
        0 => None,
        _ => Some(shutdown.subscribe()),
    };
    if shutdown.is_triggered() {
        tracing::info!("Shutdown requested before serving");
        supervisor.close().await;
        return Ok(());
    }

    let reaper = reaper_rx.map(|rx| {
        let idle_timeout = Duration::from_secs(config.datastore.idle_timeout_secs);
        let reaper = IdleReaper::new(supervisor.clone(), idle_timeout);
        tokio::spawn(reaper.run(rx))
    });

    let server = HttpServer::with_routes(config, supervisor.clone(), maintenance, routes);
    let result = server.run(listener, server_rx).await;

    shutdown.trigger();
    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    supervisor.close().await;
    tracing::info!("Shutdown complete");

    result.context("HTTP server failed")
}
