//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: String, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Build the process configuration once at startup.
///
/// Order: defaults, then the TOML file if given, then `.env` and process
/// environment overrides. The result is validated.
pub fn load(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => GatewayConfig::default(),
    };

    if let Ok(env_file) = dotenvy::dotenv() {
        tracing::debug!(path = %env_file.display(), "Loaded .env file");
    }
    apply_env_overrides(&mut config, std::env::vars())?;

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `DBGATE_*` (and `PORT`) overrides from the given variables.
pub fn apply_env_overrides<I>(config: &mut GatewayConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (var, value) in vars {
        match var.as_str() {
            "DBGATE_DATASTORE_ADDRESS" => config.datastore.address = value,
            "DBGATE_CONNECT_TIMEOUT_MS" => {
                config.datastore.connect_timeout_ms = parse(&var, &value)?;
            }
            "DBGATE_EAGER_CONNECT" => config.datastore.eager_connect = parse(&var, &value)?,
            "DBGATE_IDLE_TIMEOUT_SECS" => {
                config.datastore.idle_timeout_secs = parse(&var, &value)?;
            }
            "DBGATE_FAILURE_THRESHOLD" => {
                config.circuit_breaker.failure_threshold = parse(&var, &value)?;
            }
            "DBGATE_RESET_TIMEOUT_SECS" => {
                config.circuit_breaker.reset_timeout_secs = parse(&var, &value)?;
            }
            "DBGATE_REQUEST_TIMEOUT_MS" => config.gate.request_timeout_ms = parse(&var, &value)?,
            "DBGATE_BIND_ADDRESS" => config.listener.bind_address = value,
            "PORT" => {
                let port: u16 = parse(&var, &value)?;
                let host = config
                    .listener
                    .bind_address
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                config.listener.bind_address = format!("{}:{}", host, port);
            }
            "DBGATE_LOG_LEVEL" => config.observability.log_level = value,
            _ => {}
        }
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}
