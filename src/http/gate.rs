//! Request gate.
//!
//! # Responsibilities
//! - Let exempt paths (health) through without touching the datastore
//! - Wait for a datastore handle, never longer than the gate timeout
//! - Stamp activity and attach the handle to admitted requests
//! - Turn every failure into a 503 with a retry hint
//!
//! # Design Decisions
//! - The gate branches on the error kind, never on error text
//! - A gate timeout does not cancel the attempt it was waiting on
//! - The circuit-open path never reaches the connector

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::GateConfig;
use crate::datastore::Connector;
use crate::http::request::request_id_of;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::timeouts;
use crate::supervisor::{ConnectionSupervisor, GateError};

/// Datastore handle attached to requests that passed the gate.
#[derive(Clone, Debug)]
pub struct Db<H>(pub H);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: &'static str,
    message: &'static str,
    retry_after: u64,
}

/// A 503 produced by the gate.
#[derive(Debug, Clone)]
pub struct GateRejection {
    pub error: GateError,
    pub retry_after_secs: u64,
}

impl GateRejection {
    pub fn new(error: GateError, gate: &GateConfig) -> Self {
        let retry_after_secs = error.retry_after_secs(gate);
        Self {
            error,
            retry_after_secs,
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let (error, message) = match self.error {
            GateError::CircuitOpen(_) => (
                "Database temporarily unavailable",
                "Service is recovering from connection issues",
            ),
            GateError::Connect(_) | GateError::Timeout(_) => (
                "Database connection failed",
                "Service temporarily unavailable",
            ),
        };

        let body = RejectionBody {
            error,
            message,
            retry_after: self.retry_after_secs,
        };
        let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(self.retry_after_secs),
        );
        response
    }
}

/// Wait for a usable handle, bounded by `limit`.
pub async fn admit<C: Connector>(
    supervisor: &ConnectionSupervisor<C>,
    limit: Duration,
) -> Result<C::Handle, GateError> {
    timeouts::bounded(limit, supervisor.connect()).await
}

pub async fn gate_middleware<C: Connector>(
    State(state): State<AppState<C>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if state.gate.is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    match admit(&state.supervisor, state.gate.request_timeout()).await {
        Ok(handle) => {
            state.supervisor.update_activity();
            req.extensions_mut().insert(Db(handle));
            next.run(req).await
        }
        Err(error) => {
            let request_id = request_id_of(&req);
            let path = req.uri().path();
            match &error {
                GateError::CircuitOpen(open) => tracing::warn!(
                    request_id = %request_id,
                    path = %path,
                    retry_in_ms = open.retry_in.map(|d| d.as_millis() as u64),
                    "Circuit breaker open, rejecting request"
                ),
                GateError::Timeout(limit) => tracing::warn!(
                    request_id = %request_id,
                    path = %path,
                    timeout_ms = limit.as_millis() as u64,
                    "Timed out waiting for datastore connection"
                ),
                GateError::Connect(cause) => tracing::error!(
                    request_id = %request_id,
                    path = %path,
                    error = %cause,
                    "Datastore connection failed, rejecting request"
                ),
            }
            metrics::record_gate_rejection(error.kind());
            GateRejection::new(error, &state.gate).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{CircuitOpenError, ConnectError};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn circuit_open_rejection_shape() {
        let gate = GateConfig::default();
        let error = GateError::CircuitOpen(CircuitOpenError { retry_in: None });
        let response = GateRejection::new(error, &gate).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        let body = body_json(response).await;
        assert_eq!(body["error"], "Database temporarily unavailable");
        assert_eq!(body["message"], "Service is recovering from connection issues");
        assert_eq!(body["retryAfter"], 30);
    }

    #[tokio::test]
    async fn connect_and_timeout_rejections_share_shape() {
        let gate = GateConfig::default();
        for error in [
            GateError::Connect(ConnectError::new("connection refused")),
            GateError::Timeout(Duration::from_millis(8000)),
        ] {
            let response = GateRejection::new(error, &gate).into_response();
            assert_eq!(response.headers()[header::RETRY_AFTER], "15");
            let body = body_json(response).await;
            assert_eq!(body["error"], "Database connection failed");
            assert_eq!(body["message"], "Service temporarily unavailable");
            assert_eq!(body["retryAfter"], 15);
        }
    }
}
