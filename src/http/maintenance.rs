//! Maintenance trigger hook.
//!
//! Runs after the gate, so only admitted requests can trigger maintenance.
//! The request itself is never delayed by it.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::datastore::Connector;
use crate::http::server::AppState;

pub async fn maintenance_middleware<C: Connector>(
    State(state): State<AppState<C>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(maintenance) = &state.maintenance {
        let _ = maintenance.maybe_schedule(req.uri().path());
    }
    next.run(req).await
}
