//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dbgate_requests_total` (counter): requests by method, status
//! - `dbgate_request_duration_seconds` (histogram): latency distribution
//! - `dbgate_connect_attempts_total` (counter): underlying dials by outcome
//! - `dbgate_gate_rejections_total` (counter): 503s by kind
//! - `dbgate_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `dbgate_maintenance_runs_total` (counter): runs by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!(
        "dbgate_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "dbgate_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_connect_attempt(outcome: &'static str) {
    metrics::counter!("dbgate_connect_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_gate_rejection(kind: &'static str) {
    metrics::counter!("dbgate_gate_rejections_total", "kind" => kind).increment(1);
}

pub fn record_circuit_state(value: f64) {
    metrics::gauge!("dbgate_circuit_state").set(value);
}

pub fn record_maintenance_run(outcome: &'static str) {
    metrics::counter!("dbgate_maintenance_runs_total", "outcome" => outcome).increment(1);
}
