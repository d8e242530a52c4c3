//! Timeout enforcement for the request gate.
//!
//! Bounds how long a request waits for a connection. Expiry ends the wait
//! only; whatever was being awaited keeps running if it lives on its own task.

use std::future::Future;
use std::time::Duration;

use crate::supervisor::{AcquireError, GateError};

/// Await `fut` for at most `limit`.
pub async fn bounded<F, T>(limit: Duration, fut: F) -> Result<T, GateError>
where
    F: Future<Output = Result<T, AcquireError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(GateError::from),
        Err(_) => Err(GateError::Timeout(limit)),
    }
}
