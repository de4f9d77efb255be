//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to install the metrics recorder.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to install the log subscriber.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
