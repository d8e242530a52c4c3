//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and addresses. All
//! problems are collected rather than stopping at the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let target = config.datastore.address.trim();
    if target.is_empty() {
        errors.push(ValidationError::new("datastore.address", "must not be empty"));
    } else if !target.rsplit_once(':').is_some_and(|(host, port)| {
        !host.is_empty() && port.parse::<u16>().is_ok()
    }) {
        errors.push(ValidationError::new(
            "datastore.address",
            format!("'{}' must be host:port", target),
        ));
    }

    if config.datastore.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("datastore.connect_timeout_ms", "must be > 0"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be >= 1"));
    }
    if config.circuit_breaker.reset_timeout_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.reset_timeout_secs", "must be > 0"));
    }

    if config.gate.request_timeout_ms == 0 {
        errors.push(ValidationError::new("gate.request_timeout_ms", "must be > 0"));
    }
    for path in &config.gate.exempt_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                "gate.exempt_paths",
                format!("'{}' must start with '/'", path),
            ));
        }
    }

    let p = config.maintenance.probability;
    if !(0.0..=1.0).contains(&p) {
        errors.push(ValidationError::new(
            "maintenance.probability",
            format!("{} is outside 0.0..=1.0", p),
        ));
    }
    for path in &config.maintenance.trigger_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                "maintenance.trigger_paths",
                format!("'{}' must start with '/'", path),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
