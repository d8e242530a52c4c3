//! Connection failure taxonomy.
//!
//! `ConnectError` means the datastore was actually dialed and the dial failed.
//! `CircuitOpenError` means no dial happened because the breaker refused it.
//! `GateError::Timeout` is the request gate giving up on waiting; the attempt
//! it was waiting on keeps running.

use std::time::Duration;

use thiserror::Error;

use crate::config::GateConfig;
use crate::datastore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("datastore connection failed: {cause}")]
pub struct ConnectError {
    pub cause: String,
}

impl ConnectError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    pub(crate) fn abandoned() -> Self {
        Self::new("connection attempt abandoned before completing")
    }
}

impl From<datastore::Error> for ConnectError {
    fn from(e: datastore::Error) -> Self {
        Self::new(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker open: datastore connection attempts suspended")]
pub struct CircuitOpenError {
    /// Remaining cool-down when the attempt was refused.
    pub retry_in: Option<Duration>,
}

/// Why `ConnectionSupervisor::connect` produced no handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

/// Why the request gate turned a request away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error(transparent)]
    Connect(ConnectError),

    #[error(transparent)]
    CircuitOpen(CircuitOpenError),

    #[error("datastore connection not ready within {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl From<AcquireError> for GateError {
    fn from(e: AcquireError) -> Self {
        match e {
            AcquireError::Connect(e) => GateError::Connect(e),
            AcquireError::CircuitOpen(e) => GateError::CircuitOpen(e),
        }
    }
}

impl GateError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Connect(_) => "connect_failed",
            GateError::CircuitOpen(_) => "circuit_open",
            GateError::Timeout(_) => "timeout",
        }
    }

    /// Retry hint in seconds; the breaker's cool-down dominates when it is open.
    pub fn retry_after_secs(&self, gate: &GateConfig) -> u64 {
        match self {
            GateError::CircuitOpen(_) => gate.retry_after_circuit_secs,
            GateError::Connect(_) | GateError::Timeout(_) => gate.retry_after_connect_secs,
        }
    }
}
