//! HTTP boundary subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request.rs (assign / echo x-request-id)
//!     → gate.rs (exempt path? else wait for a datastore handle, bounded)
//!         → rejected: 503 {error, message, retryAfter}
//!         → admitted: activity stamped, handle attached to the request
//!     → maintenance.rs (maybe schedule detached maintenance)
//!     → server.rs handlers (/health, /health/db, /, embedder routes)
//! ```

pub mod gate;
pub mod maintenance;
pub mod request;
pub mod server;

pub use gate::{Db, GateRejection};
pub use request::{request_id_of, MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
