//! The interface for reaching the primary datastore.
//!
//! The supervisor never dials anything itself: it asks a [`Connector`] for a
//! handle and treats the result as opaque. Swapping the datastore means
//! writing a new connector, nothing else.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod tcp;

pub use tcp::{TcpConnector, TcpLink};

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// Describes how a datastore handle is established and released.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Shared, cheaply cloned handle given to every request once connected.
    type Handle: Clone + Send + Sync + 'static;

    /// Make one connection attempt.
    async fn connect(&self) -> Result<Self::Handle, Error>;

    /// Release a handle the supervisor is discarding.
    async fn close(&self, _handle: Self::Handle) {}

    /// Human-readable target, for logs and stats.
    fn target(&self) -> String;
}
