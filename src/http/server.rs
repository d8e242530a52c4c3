//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the built-in and embedder routes
//! - Wire up middleware (request ID, tracing, gate, maintenance, metrics)
//! - Serve health and statistics without touching the datastore
//! - Bind to a listener and shut down gracefully

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{GateConfig, GatewayConfig};
use crate::datastore::Connector;
use crate::health::report::{DbHealthReport, LivenessReport, ReportFailure};
use crate::http::gate::gate_middleware;
use crate::http::maintenance::maintenance_middleware;
use crate::http::request::{request_id_layers, request_id_of};
use crate::maintenance::MaintenanceScheduler;
use crate::observability::metrics;
use crate::supervisor::ConnectionSupervisor;

/// Application state injected into handlers and middleware.
pub struct AppState<C: Connector> {
    pub supervisor: ConnectionSupervisor<C>,
    pub gate: Arc<GateConfig>,
    pub maintenance: Option<Arc<MaintenanceScheduler<C>>>,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            gate: Arc::clone(&self.gate),
            maintenance: self.maintenance.clone(),
        }
    }
}

/// HTTP front for the connection supervisor.
pub struct HttpServer<C: Connector> {
    router: Router,
    config: GatewayConfig,
    supervisor: ConnectionSupervisor<C>,
}

impl<C: Connector> HttpServer<C> {
    pub fn new(config: GatewayConfig, supervisor: ConnectionSupervisor<C>) -> Self {
        Self::with_routes(config, supervisor, None, Router::new())
    }

    /// Build a server that also serves `routes` behind the gate.
    ///
    /// Handlers in `routes` can extract `Extension<Db<C::Handle>>`.
    pub fn with_routes(
        config: GatewayConfig,
        supervisor: ConnectionSupervisor<C>,
        maintenance: Option<MaintenanceScheduler<C>>,
        routes: Router<AppState<C>>,
    ) -> Self {
        let state = AppState {
            supervisor: supervisor.clone(),
            gate: Arc::new(config.gate.clone()),
            maintenance: maintenance.map(Arc::new),
        };
        let router = Self::build_router(state, routes);
        Self {
            router,
            config,
            supervisor,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run outermost first: request id, trace, propagate id,
    /// metrics, gate, maintenance.
    fn build_router(state: AppState<C>, routes: Router<AppState<C>>) -> Router {
        let (set_request_id, propagate_request_id) = request_id_layers();

        Router::new()
            .route("/", get(root))
            .route("/health", get(liveness::<C>))
            .route("/health/db", get(db_health::<C>))
            .merge(routes)
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                state.clone(),
                maintenance_middleware::<C>,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                gate_middleware::<C>,
            ))
            .layer(middleware::from_fn(track_request))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id)
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |req: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %req.method(),
                                path = %req.uri().path(),
                                request_id = %request_id_of(req),
                            )
                        },
                    ))
                    .layer(propagate_request_id),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            datastore = %self.supervisor.target(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn root() -> &'static str {
    "dbgate is running"
}

async fn liveness<C: Connector>(State(state): State<AppState<C>>) -> Response {
    let stats = state.supervisor.stats();
    let now = state.supervisor.clock().wall();
    Json(LivenessReport::new(&stats, now)).into_response()
}

async fn db_health<C: Connector>(State(state): State<AppState<C>>) -> Response {
    let stats = state.supervisor.stats();
    let now = state.supervisor.clock().wall();
    match serde_json::to_value(DbHealthReport::new(&stats, now)) {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build datastore health report");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReportFailure::new(e.to_string(), now)),
            )
                .into_response()
        }
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

async fn track_request(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let response = next.run(req).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
