//! Connection supervision subsystem.
//!
//! # Data Flow
//! ```text
//! connect()
//!     → CONNECTED?  return shared handle
//!     → CONNECTING? await the in-flight attempt's outcome
//!     → otherwise:  breaker.can_attempt()
//!                       → refused: CircuitOpenError (no dial)
//!                       → admitted: spawn one attempt, await its outcome
//!
//! spawned attempt:
//!     connector.connect() bounded by datastore.connect_timeout
//!     → settle under the state lock (phase, timestamps, breaker outcome)
//!     → publish outcome to every waiter
//! ```
//!
//! # Design Decisions
//! - One state mutex; the breaker is only consulted or updated while it is
//!   held, so phase and breaker transitions never interleave
//! - The attempt runs on its own task: a caller that stops waiting does not
//!   cancel it, and its outcome still lands in shared state
//! - No internal retry loop; the next inbound request drives the next attempt

pub mod error;
pub mod idle;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::clock::SharedClock;
use crate::config::{CircuitBreakerConfig, DatastoreConfig};
use crate::datastore::{self, Connector};
use crate::health::activity::ActivityTracker;
use crate::health::report::{PoolStats, StatsSnapshot};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;

pub use error::{AcquireError, CircuitOpenError, ConnectError, GateError};
pub use idle::IdleReaper;
pub use state::Phase;

use state::{ConnectionState, Outcome, Slot};

/// Owner of the single datastore handle.
///
/// Cloning is cheap and every clone supervises the same connection.
pub struct ConnectionSupervisor<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for ConnectionSupervisor<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<C: Connector> {
    connector: C,
    target: String,
    breaker: CircuitBreaker,
    activity: ActivityTracker,
    clock: SharedClock,
    connect_timeout: Duration,
    state: Mutex<ConnectionState<C::Handle>>,
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(
        connector: C,
        datastore: &DatastoreConfig,
        breaker: &CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Self {
        let target = connector.target();
        Self {
            shared: Arc::new(Shared {
                connector,
                target,
                breaker: CircuitBreaker::new(breaker, clock.clone()),
                activity: ActivityTracker::new(clock.clone()),
                clock,
                connect_timeout: datastore.connect_timeout(),
                state: Mutex::new(ConnectionState::new()),
            }),
        }
    }

    /// Obtain the shared handle, connecting lazily if needed.
    ///
    /// Concurrent callers during an attempt all wait on that one attempt and
    /// observe the same outcome.
    pub async fn connect(&self) -> Result<C::Handle, AcquireError> {
        let mut outcome = {
            let mut state = self.shared.lock();
            let in_flight = match &state.slot {
                Slot::Connected(handle) => return Ok(handle.clone()),
                // A closed sender means the attempt task died without settling.
                Slot::Connecting { outcome, .. } if outcome.has_changed().is_ok() => {
                    Some(outcome.clone())
                }
                _ => None,
            };
            match in_flight {
                Some(outcome) => outcome,
                None => {
                    if let Slot::Connecting { attempt, .. } = state.slot {
                        self.shared.abandon(&mut state, attempt);
                    }
                    if !self.shared.breaker.can_attempt() {
                        return Err(self.shared.deny(&mut state).into());
                    }
                    self.shared.begin_attempt(&mut state)
                }
            }
        };

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone().unwrap_or_else(|| Err(ConnectError::abandoned())),
            Err(_) => Err(ConnectError::abandoned()),
        };
        result.map_err(AcquireError::from)
    }

    /// Connected and the breaker is not refusing attempts.
    pub fn is_healthy(&self) -> bool {
        let state = self.shared.lock();
        StatsSnapshot::derive_healthy(state.slot.phase(), self.shared.breaker.state())
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().slot.phase()
    }

    /// The handle if connected right now; never starts an attempt.
    pub fn current_handle(&self) -> Option<C::Handle> {
        match &self.shared.lock().slot {
            Slot::Connected(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Stamp request activity; called once per request that passed the gate.
    pub fn update_activity(&self) {
        self.shared.activity.touch();
    }

    /// Consistent snapshot of connection, breaker and activity state.
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.shared.lock();
        let phase = state.slot.phase();
        let circuit_breaker = self.shared.breaker.snapshot();
        StatsSnapshot {
            phase,
            is_healthy: StatsSnapshot::derive_healthy(phase, circuit_breaker.state),
            pool: PoolStats {
                target: self.shared.target.clone(),
                attempt_in_flight: phase == Phase::Connecting,
                last_connected_at: state.last_connected_at,
                last_error_at: state.last_error_at,
                last_error: state.last_error.clone(),
                connect_attempts: state.connect_attempts,
                connect_successes: state.connect_successes,
                connect_failures: state.connect_failures,
                circuit_denials: state.circuit_denials,
            },
            circuit_breaker,
            activity: self.shared.activity.snapshot(),
        }
    }

    /// The breaker guarding this connection.
    ///
    /// Only the supervisor moves it between states; outside the crate it is
    /// read-only.
    ///
    /// ```compile_fail
    /// use dbgate::datastore::TcpConnector;
    /// use dbgate::supervisor::ConnectionSupervisor;
    ///
    /// fn force_half_open(supervisor: &ConnectionSupervisor<TcpConnector>) -> bool {
    ///     supervisor.breaker().can_attempt()
    /// }
    /// ```
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.shared.breaker
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.shared.activity
    }

    pub fn clock(&self) -> &SharedClock {
        &self.shared.clock
    }

    pub fn target(&self) -> &str {
        &self.shared.target
    }

    /// Report that the current handle no longer works.
    ///
    /// Counts as a breaker failure and moves the phase to FAILED, so the next
    /// gated request reconnects. Does nothing unless connected.
    pub fn report_broken(&self, reason: &str) {
        let handle = {
            let mut state = self.shared.lock();
            if !matches!(state.slot, Slot::Connected(_)) {
                return;
            }
            let Slot::Connected(handle) = std::mem::replace(&mut state.slot, Slot::Failed) else {
                return;
            };
            let now = self.shared.clock.wall();
            state.record_error(now, format!("connection reported broken: {}", reason));
            self.shared.breaker.record_failure();
            handle
        };
        tracing::warn!(datastore = %self.shared.target, reason, "Datastore handle reported broken");
        self.shared.spawn_close(handle);
    }

    /// Time since the connection was last useful: the later of the last
    /// gated request and the moment it connected.
    pub fn idle_for(&self) -> Option<Duration> {
        let state = self.shared.lock();
        self.shared.idle_for(&state)
    }

    /// Close the handle if it has been idle at least `idle_timeout`.
    ///
    /// Returns whether a handle was released. The phase becomes DISCONNECTED
    /// and the next gated request reconnects lazily.
    pub async fn release_idle(&self, idle_timeout: Duration) -> bool {
        let handle = {
            let mut state = self.shared.lock();
            if !matches!(state.slot, Slot::Connected(_)) {
                return false;
            }
            match self.shared.idle_for(&state) {
                Some(idle) if idle >= idle_timeout => {}
                _ => return false,
            }
            match std::mem::replace(&mut state.slot, Slot::Disconnected) {
                Slot::Connected(handle) => handle,
                _ => return false,
            }
        };
        tracing::info!(
            datastore = %self.shared.target,
            idle_timeout_secs = idle_timeout.as_secs(),
            "Releasing idle datastore connection"
        );
        self.shared.connector.close(handle).await;
        true
    }

    /// Drop the handle for shutdown. An attempt already in flight is left to settle.
    pub async fn close(&self) {
        let handle = {
            let mut state = self.shared.lock();
            if matches!(state.slot, Slot::Connected(_)) {
                match std::mem::replace(&mut state.slot, Slot::Disconnected) {
                    Slot::Connected(handle) => Some(handle),
                    _ => None,
                }
            } else {
                None
            }
        };
        if let Some(handle) = handle {
            self.shared.connector.close(handle).await;
            tracing::info!(datastore = %self.shared.target, "Datastore connection closed");
        }
    }
}

impl<C: Connector> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, ConnectionState<C::Handle>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_attempt(
        self: &Arc<Self>,
        state: &mut ConnectionState<C::Handle>,
    ) -> watch::Receiver<Outcome<C::Handle>> {
        state.attempt_seq += 1;
        state.connect_attempts += 1;
        let attempt = state.attempt_seq;

        let (tx, rx) = watch::channel(None);
        state.slot = Slot::Connecting {
            attempt,
            outcome: rx.clone(),
        };
        tracing::info!(attempt, datastore = %self.target, "Connecting to datastore");

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.dial().await;
            shared.settle(attempt, &result);
            tx.send_replace(Some(result));
        });
        rx
    }

    async fn dial(&self) -> Result<C::Handle, ConnectError> {
        match tokio::time::timeout(self.connect_timeout, self.connector.connect()).await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(datastore::Error::Timeout(self.connect_timeout).into()),
        }
    }

    /// Apply an attempt's outcome. Only the attempt currently occupying the
    /// CONNECTING slot may change state.
    fn settle(self: &Arc<Self>, attempt: u64, result: &Result<C::Handle, ConnectError>) {
        let mut state = self.lock();
        let current = matches!(state.slot, Slot::Connecting { attempt: a, .. } if a == attempt);
        if !current {
            tracing::debug!(attempt, "Discarding outcome of superseded connection attempt");
            if let Ok(handle) = result {
                self.spawn_close(handle.clone());
            }
            return;
        }

        let now = self.clock.wall();
        match result {
            Ok(handle) => {
                state.slot = Slot::Connected(handle.clone());
                state.last_connected_at = Some(now);
                state.connect_successes += 1;
                self.breaker.record_success();
                metrics::record_connect_attempt("success");
                tracing::info!(attempt, datastore = %self.target, "Datastore connected");
            }
            Err(e) => {
                state.slot = Slot::Failed;
                state.record_error(now, e.cause.clone());
                state.connect_failures += 1;
                self.breaker.record_failure();
                metrics::record_connect_attempt("failure");
                tracing::warn!(
                    attempt,
                    datastore = %self.target,
                    error = %e,
                    consecutive_failures = self.breaker.consecutive_failures(),
                    "Datastore connection attempt failed"
                );
            }
        }
    }

    fn abandon(&self, state: &mut ConnectionState<C::Handle>, attempt: u64) {
        let now = self.clock.wall();
        state.slot = Slot::Failed;
        state.record_error(now, ConnectError::abandoned().cause);
        state.connect_failures += 1;
        self.breaker.record_failure();
        metrics::record_connect_attempt("abandoned");
        tracing::error!(attempt, datastore = %self.target, "Connection attempt task ended without settling");
    }

    fn deny(&self, state: &mut ConnectionState<C::Handle>) -> CircuitOpenError {
        let now = self.clock.wall();
        let err = CircuitOpenError {
            retry_in: self
                .breaker
                .snapshot()
                .retry_in_ms
                .map(Duration::from_millis),
        };
        state.circuit_denials += 1;
        state.record_error(now, err.to_string());
        metrics::record_connect_attempt("denied");
        tracing::debug!(datastore = %self.target, retry_in = ?err.retry_in, "Connection attempt refused by circuit breaker");
        err
    }

    fn idle_for(&self, state: &ConnectionState<C::Handle>) -> Option<Duration> {
        let since: Option<DateTime<Utc>> =
            match (self.activity.last_activity_at(), state.last_connected_at) {
                (Some(a), Some(c)) => Some(a.max(c)),
                (a, c) => a.or(c),
            };
        since.map(|at| (self.clock.wall() - at).to_std().unwrap_or(Duration::ZERO))
    }

    fn spawn_close(self: &Arc<Self>, handle: C::Handle) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared.connector.close(handle).await;
        });
    }
}
