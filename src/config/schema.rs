//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the datastore gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The datastore the supervisor connects to.
    pub datastore: DatastoreConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Request gate behaviour.
    pub gate: GateConfig,

    /// Probabilistic maintenance trigger.
    pub maintenance: MaintenanceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Datastore connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Connection target ("host:port").
    pub address: String,

    /// Upper bound on a single underlying connection attempt, in milliseconds.
    /// Keeps a hung dial from pinning the in-flight slot forever.
    pub connect_timeout_ms: u64,

    /// Connect once before accepting traffic; failure aborts startup.
    pub eager_connect: bool,

    /// Close the connection after this long without gated traffic (0 disables).
    pub idle_timeout_secs: u64,
}

impl DatastoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:27017".to_string(),
            connect_timeout_ms: 5_000,
            eager_connect: true,
            idle_timeout_secs: 0,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed attempts that trip the breaker.
    pub failure_threshold: u32,

    /// How long the breaker stays open before admitting a probe, in seconds.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
        }
    }
}

/// Request gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Longest a request waits for a ready connection, in milliseconds.
    pub request_timeout_ms: u64,

    /// Paths that never touch the datastore.
    pub exempt_paths: Vec<String>,

    /// `retryAfter` hint for a failed or timed-out connection, in seconds.
    pub retry_after_connect_secs: u64,

    /// `retryAfter` hint while the breaker refuses attempts, in seconds.
    pub retry_after_circuit_secs: u64,
}

impl GateConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 8_000,
            exempt_paths: vec!["/health".to_string(), "/health/db".to_string()],
            retry_after_connect_secs: 15,
            retry_after_circuit_secs: 30,
        }
    }
}

/// Maintenance trigger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Enable the trigger.
    pub enabled: bool,

    /// Chance that a qualifying request schedules a run (0.0 - 1.0).
    pub probability: f64,

    /// Delay between scheduling and running, in milliseconds.
    pub delay_ms: u64,

    /// Request paths that qualify. "/" matches only the root; others match by prefix.
    pub trigger_paths: Vec<String>,
}

impl MaintenanceConfig {
    pub fn qualifies(&self, path: &str) -> bool {
        self.trigger_paths.iter().any(|p| {
            if p == "/" {
                path == "/"
            } else {
                path == p || path.starts_with(&format!("{}/", p.trim_end_matches('/')))
            }
        })
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.005,
            delay_ms: 100,
            trigger_paths: vec!["/".to_string(), "/api/v1/posts".to_string()],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
