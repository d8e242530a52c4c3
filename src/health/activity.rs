//! Request activity tracking.
//!
//! Records when the last gated request got through. Written on every
//! request, read by the health report and the idle reaper, so it is a pair
//! of atomics rather than anything behind the supervisor's lock.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::SharedClock;

const NEVER: i64 = i64::MIN;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySnapshot {
    pub last_activity_at: Option<DateTime<Utc>>,
    pub idle_ms: Option<u64>,
    pub requests_total: u64,
}

#[derive(Debug)]
pub struct ActivityTracker {
    clock: SharedClock,
    /// Unix millis of the latest activity; only ever raised.
    last_activity_ms: AtomicI64,
    requests_total: AtomicU64,
}

impl ActivityTracker {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            last_activity_ms: AtomicI64::new(NEVER),
            requests_total: AtomicU64::new(0),
        }
    }

    /// Stamp activity at the current time.
    pub fn touch(&self) {
        let now = self.clock.wall().timestamp_millis();
        // fetch_max keeps the stamp monotonic if two touches race or the wall clock steps back
        self.last_activity_ms.fetch_max(now, Ordering::AcqRel);
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        match self.last_activity_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    /// Time since the last activity, `None` if there never was any.
    pub fn idle_for(&self) -> Option<Duration> {
        let last = self.last_activity_at()?;
        Some((self.clock.wall() - last).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            last_activity_at: self.last_activity_at(),
            idle_ms: self.idle_for().map(|d| d.as_millis() as u64),
            requests_total: self.requests_total(),
        }
    }
}
