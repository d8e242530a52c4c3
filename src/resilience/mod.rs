//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gated request:
//!     → timeouts.rs (bound the wait for a connection)
//!     → supervisor asks circuit_breaker.rs whether a dial is allowed
//!     → attempt outcome recorded back into circuit_breaker.rs
//! ```
//!
//! # Design Decisions
//! - Every wait on the datastore has a deadline
//! - No retry loop: the breaker's half-open probe is the only re-dial policy,
//!   and it is driven by inbound requests
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod timeouts;
