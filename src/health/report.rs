//! Health and statistics reporting.
//!
//! Plain data composed from the supervisor, breaker and activity tracker.
//! Nothing here mutates state or waits on a connection attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::rfc3339;
use crate::health::activity::ActivitySnapshot;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};
use crate::supervisor::Phase;

/// Connection counters and timestamps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub target: String,
    pub attempt_in_flight: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub connect_attempts: u64,
    pub connect_successes: u64,
    pub connect_failures: u64,
    pub circuit_denials: u64,
}

/// Point-in-time view of the whole connection lifecycle.
///
/// Every field is read inside the supervisor's critical section, so the
/// phase and breaker state always agree with each other.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub phase: Phase,
    pub is_healthy: bool,
    pub pool: PoolStats,
    pub circuit_breaker: BreakerSnapshot,
    pub activity: ActivitySnapshot,
}

impl StatsSnapshot {
    /// Healthy means connected with a breaker that is not refusing attempts.
    pub fn derive_healthy(phase: Phase, circuit: CircuitState) -> bool {
        phase == Phase::Connected && circuit != CircuitState::Open
    }
}

/// Body of `GET /health/db`.
#[derive(Debug, Serialize)]
pub struct DbHealthReport<'a> {
    pub status: &'static str,
    pub connection: Phase,
    #[serde(flatten)]
    pub stats: &'a StatsSnapshot,
    pub timestamp: String,
}

impl<'a> DbHealthReport<'a> {
    pub fn new(stats: &'a StatsSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            status: if stats.is_healthy { "healthy" } else { "unhealthy" },
            connection: stats.phase,
            stats,
            timestamp: rfc3339(now),
        }
    }
}

/// Body of `GET /health`; liveness only, never touches the datastore.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessReport<'a> {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: String,
    pub db_health: bool,
    pub connection_stats: &'a StatsSnapshot,
}

impl<'a> LivenessReport<'a> {
    pub fn new(stats: &'a StatsSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            status: "ok",
            message: "dbgate is healthy",
            timestamp: rfc3339(now),
            db_health: stats.is_healthy,
            connection_stats: stats,
        }
    }
}

/// Body of a failed `GET /health/db`.
#[derive(Debug, Serialize)]
pub struct ReportFailure {
    pub status: &'static str,
    pub message: String,
    pub timestamp: String,
}

impl ReportFailure {
    pub fn new(message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            timestamp: rfc3339(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(phase: Phase, state: CircuitState) -> StatsSnapshot {
        StatsSnapshot {
            phase,
            is_healthy: StatsSnapshot::derive_healthy(phase, state),
            pool: PoolStats {
                target: "db:27017".into(),
                attempt_in_flight: false,
                last_connected_at: None,
                last_error_at: None,
                last_error: Some("refused".into()),
                connect_attempts: 1,
                connect_successes: 0,
                connect_failures: 1,
                circuit_denials: 0,
            },
            circuit_breaker: BreakerSnapshot {
                state,
                consecutive_failures: 1,
                failure_threshold: 5,
                reset_timeout_ms: 30_000,
                opened_at: None,
                retry_in_ms: None,
                probe_in_flight: false,
                times_opened: 0,
            },
            activity: ActivitySnapshot {
                last_activity_at: None,
                idle_ms: None,
                requests_total: 0,
            },
        }
    }

    #[test]
    fn healthy_requires_connected_and_not_open() {
        assert!(StatsSnapshot::derive_healthy(Phase::Connected, CircuitState::Closed));
        assert!(StatsSnapshot::derive_healthy(Phase::Connected, CircuitState::HalfOpen));
        assert!(!StatsSnapshot::derive_healthy(Phase::Connected, CircuitState::Open));
        assert!(!StatsSnapshot::derive_healthy(Phase::Failed, CircuitState::Closed));
    }

    #[test]
    fn db_report_flattens_stats() {
        let snapshot = stats(Phase::Failed, CircuitState::Closed);
        let value = serde_json::to_value(DbHealthReport::new(&snapshot, Utc::now())).unwrap();

        assert_eq!(value["status"], "unhealthy");
        assert_eq!(value["connection"], "FAILED");
        assert_eq!(value["phase"], "FAILED");
        assert_eq!(value["circuitBreaker"]["state"], "CLOSED");
        assert_eq!(value["pool"]["lastError"], "refused");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
