//! Background maintenance subsystem.
//!
//! # Data Flow
//! ```text
//! Qualifying request (see MaintenanceConfig::trigger_paths)
//!     → scheduler.rs rolls against `probability`
//!     → detached task sleeps `delay_ms`
//!     → obtains a handle through ConnectionSupervisor::connect
//!     → runs every registered MaintenanceTask concurrently
//! ```
//!
//! # Design Decisions
//! - Never delays or fails the triggering request
//! - At most one run at a time; overlapping triggers are dropped
//! - Uses the same connect path as requests, so the breaker applies

pub mod scheduler;

use async_trait::async_trait;

pub use scheduler::MaintenanceScheduler;

/// A unit of housekeeping run against the datastore.
#[async_trait]
pub trait MaintenanceTask<H: Send + 'static>: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self, handle: H) -> anyhow::Result<()>;
}
