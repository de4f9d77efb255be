//! Logging and metrics setup for the Baribhara API gateway.
//!
//! - **Logging**: `tracing-subscriber` with an env filter and a JSON or
//!   pretty fmt layer
//! - **Metrics**: a Prometheus recorder for the `metrics` facade, rendered
//!   by the gateway's own `/metrics` endpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use baribhara_telemetry::{init_telemetry, LogConfig, MetricsConfig, TelemetryConfig};
//!
//! let config = TelemetryConfig {
//!     logging: LogConfig::for_mode("release"),
//!     metrics: MetricsConfig::default(),
//! };
//! let metrics = init_telemetry(&config)?;
//! if let Some(metrics) = metrics {
//!     println!("{}", metrics.render());
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, InFlightGuard, MetricsConfig, MetricsRegistry};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Configuration for both subsystems.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Logging configuration.
    pub logging: LogConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

/// Initializes logging, then metrics.
///
/// Returns the metrics registry when metrics are enabled.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)
}
