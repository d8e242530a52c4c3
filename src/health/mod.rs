//! Health and activity subsystem.
//!
//! # Data Flow
//! ```text
//! Gated request admitted
//!     → activity.rs (stamp last activity, count request)
//!
//! /health, /health/db, stats callers
//!     → ConnectionSupervisor::stats (one consistent snapshot)
//!     → report.rs (shape into response bodies)
//! ```
//!
//! # Design Decisions
//! - Reporting never connects, waits, or moves the breaker
//! - "Healthy" is derived from phase and breaker state, never stored

pub mod activity;
pub mod report;

pub use activity::{ActivitySnapshot, ActivityTracker};
pub use report::{DbHealthReport, LivenessReport, PoolStats, ReportFailure, StatsSnapshot};
