//! Connection state owned by the supervisor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::supervisor::error::ConnectError;

/// Lifecycle phase of the datastore connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Disconnected => "DISCONNECTED",
            Phase::Connecting => "CONNECTING",
            Phase::Connected => "CONNECTED",
            Phase::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one attempt as published to its waiters; `None` until settled.
pub(crate) type Outcome<H> = Option<Result<H, ConnectError>>;

/// The handle only exists inside `Connected`, so "handle present iff
/// connected" holds by construction.
pub(crate) enum Slot<H> {
    Disconnected,
    Connecting {
        attempt: u64,
        outcome: watch::Receiver<Outcome<H>>,
    },
    Connected(H),
    Failed,
}

impl<H> Slot<H> {
    pub(crate) fn phase(&self) -> Phase {
        match self {
            Slot::Disconnected => Phase::Disconnected,
            Slot::Connecting { .. } => Phase::Connecting,
            Slot::Connected(_) => Phase::Connected,
            Slot::Failed => Phase::Failed,
        }
    }
}

pub(crate) struct ConnectionState<H> {
    pub(crate) slot: Slot<H>,
    pub(crate) attempt_seq: u64,
    pub(crate) last_connected_at: Option<DateTime<Utc>>,
    pub(crate) last_error_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    pub(crate) connect_attempts: u64,
    pub(crate) connect_successes: u64,
    pub(crate) connect_failures: u64,
    pub(crate) circuit_denials: u64,
}

impl<H> ConnectionState<H> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Slot::Disconnected,
            attempt_seq: 0,
            last_connected_at: None,
            last_error_at: None,
            last_error: None,
            connect_attempts: 0,
            connect_successes: 0,
            connect_failures: 0,
            circuit_denials: 0,
        }
    }

    pub(crate) fn record_error(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.last_error_at = Some(at);
    }
}
