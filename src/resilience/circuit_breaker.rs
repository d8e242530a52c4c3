//! Circuit breaker guarding datastore connection attempts.
//!
//! # States
//! - Closed: attempts are permitted
//! - Open: datastore assumed down, attempts are refused without dialing
//! - Half-Open: exactly one probe attempt is out, everyone else is refused
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed, first caller admitted as probe
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (opened_at refreshed)
//! ```
//!
//! All transitions happen under one mutex, so the Open → Half-Open hand-off
//! admits a single probe no matter how many callers race for it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::SharedClock;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state as seen by callers and the health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Gauge encoding: 0 closed, 1 open, 2 half-open.
    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the breaker, for stats reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub opened_at: Option<DateTime<Utc>>,
    /// Remaining cool-down while open; zero once a probe would be admitted.
    pub retry_in_ms: Option<u64>,
    pub probe_in_flight: bool,
    pub times_opened: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    times_opened: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    clock: SharedClock,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                opened_at_wall: None,
                probe_in_flight: false,
                times_opened: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a connection attempt may be made now.
    ///
    /// When the cool-down has elapsed this moves Open → Half-Open and admits
    /// the caller as the single probe; the probe's outcome must be reported
    /// through [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub(crate) fn can_attempt(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| self.clock.now().saturating_duration_since(at))
                    .unwrap_or(self.reset_timeout);
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    metrics::record_circuit_state(CircuitState::HalfOpen.gauge_value());
                    tracing::info!(
                        cooled_down_ms = elapsed.as_millis() as u64,
                        "Circuit breaker half-open, admitting probe"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    /// An attempt succeeded: clear the failure streak and close.
    pub(crate) fn record_success(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.consecutive_failures = 0;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.opened_at_wall = None;
        inner.probe_in_flight = false;
        if previous != CircuitState::Closed {
            metrics::record_circuit_state(CircuitState::Closed.gauge_value());
            tracing::info!(from = %previous, "Circuit breaker closed, datastore recovered");
        }
    }

    /// An attempt failed: extend the streak and trip when warranted.
    pub(crate) fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.probe_in_flight = false;

        let trip = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if !trip {
            tracing::debug!(
                consecutive_failures = inner.consecutive_failures,
                threshold = self.failure_threshold,
                state = %inner.state,
                "Circuit breaker recorded failure"
            );
            return;
        }

        let previous = inner.state;
        inner.state = CircuitState::Open;
        inner.opened_at = Some(self.clock.now());
        inner.opened_at_wall = Some(self.clock.wall());
        inner.times_opened += 1;
        metrics::record_circuit_state(CircuitState::Open.gauge_value());
        tracing::warn!(
            from = %previous,
            consecutive_failures = inner.consecutive_failures,
            reset_timeout_secs = self.reset_timeout.as_secs(),
            "Circuit breaker opened"
        );
    }

    /// Current stored state. An elapsed Open is still reported as Open until
    /// the supervisor's next connection attempt performs the transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Read-only view; never transitions state.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let retry_in_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = self.clock.now().saturating_duration_since(at);
                Some(self.reset_timeout.saturating_sub(elapsed).as_millis() as u64)
            }
            _ => None,
        };
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.failure_threshold,
            reset_timeout_ms: self.reset_timeout.as_millis() as u64,
            opened_at: inner.opened_at_wall,
            retry_in_ms,
            probe_in_flight: inner.probe_in_flight,
            times_opened: inner.times_opened,
        }
    }
}
