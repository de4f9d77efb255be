//! Startup errors.
//!
//! Per-request failures are [`baribhara_core::GatewayError`]s and never
//! stop the process. The errors here abort startup.

use std::net::SocketAddr;

use baribhara_middleware::StoreError;
use baribhara_router::RouteError;
use baribhara_telemetry::TelemetryError;
use thiserror::Error;

/// Result type for startup operations.
pub type StartupResult<T> = Result<T, GatewayStartupError>;

/// Errors that prevent the gateway from starting.
#[derive(Debug, Error)]
pub enum GatewayStartupError {
    /// The config file could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The configuration is well-formed but not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The listen address does not parse.
    #[error("Invalid listen address '{addr}': {reason}")]
    Address {
        /// The configured address.
        addr: String,
        /// Parse failure.
        reason: String,
    },

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The outbound HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The counter store client could not be created.
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// The route catalogue is inconsistent.
    #[error("Route table error: {0}")]
    Routes(#[from] RouteError),

    /// Logging or metrics could not be installed.
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl GatewayStartupError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            GatewayStartupError::config("invalid TOML").to_string(),
            "Configuration error: invalid TOML"
        );
        assert_eq!(
            GatewayStartupError::invalid("jwt.secret must not be empty").to_string(),
            "Invalid configuration: jwt.secret must not be empty"
        );
    }

    #[test]
    fn test_bind_error_keeps_source() {
        let err = GatewayStartupError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "Failed to bind 127.0.0.1:8080: in use");
        assert!(std::error::Error::source(&err).is_some());
    }
}
