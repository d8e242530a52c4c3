//! Time source shared by every component.
//!
//! # Responsibilities
//! - Monotonic instants for cool-down and idleness arithmetic
//! - Wall-clock timestamps for diagnostic reporting
//! - A manually driven clock so breaker timing is testable without sleeping
//!
//! Delayed callbacks (maintenance, idle reaper) are scheduled through Tokio's
//! timer; only "what time is it" goes through [`Clock`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic now, used for elapsed-time decisions.
    fn now(&self) -> Instant;

    /// Wall-clock now, used for reporting.
    fn wall(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move both monotonic and wall time forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.offset()).unwrap_or(chrono::Duration::zero());
        self.wall_origin + offset
    }
}

/// RFC 3339 rendering with millisecond precision, as reported by the health endpoints.
pub fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let w0 = clock.wall();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now() - t0, Duration::from_secs(30));
        assert_eq!((clock.wall() - w0).num_seconds(), 30);
    }

    #[test]
    fn rfc3339_uses_zulu_and_millis() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T12:00:00.5+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(rfc3339(ts), "2024-03-01T12:00:00.500Z");
    }
}
