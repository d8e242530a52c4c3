//! dbgate: datastore connection lifecycle manager.
//!
//! Keeps one lazily established connection to the primary datastore, shares
//! it across concurrent requests, stops hammering an unreachable datastore
//! with a circuit breaker, and gates HTTP requests on connection
//! availability with a bounded wait.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::request (x-request-id)
//!                     http::gate ──────────────▶ supervisor ──▶ datastore::Connector
//!                        │  bounded wait            │   ▲
//!                        │                          ▼   │
//!                        │                 resilience::circuit_breaker
//!                        ▼
//!                     handlers (/health, /health/db, embedder routes)
//!
//!     Cross-cutting: config, observability, clock, health (activity + reports),
//!                    maintenance (probabilistic background work), lifecycle
//! ```

// Core subsystems
pub mod clock;
pub mod config;
pub mod datastore;
pub mod supervisor;

// Request boundary
pub mod health;
pub mod http;
pub mod maintenance;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::GatewayConfig;
pub use datastore::Connector;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitState};
pub use supervisor::{AcquireError, ConnectionSupervisor, GateError, Phase};
