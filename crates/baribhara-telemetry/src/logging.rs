//! Structured logging for the gateway.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and one
//! fmt layer: JSON lines in release mode, multi-line pretty output in debug
//! mode. `RUST_LOG`, when set and valid, takes precedence over the
//! configured level.
//!
//! # Example
//!
//! ```rust,ignore
//! use baribhara_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::for_mode("release"))?;
//! tracing::info!(port = 8080, "gateway listening");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable, multi-line.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive, e.g. `info` or `baribhara_gateway=debug,info`.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include the event target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            file_line_info: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Picks the format for a server mode: `release` logs JSON, anything
    /// else logs pretty output with source locations.
    #[must_use]
    pub fn for_mode(mode: &str) -> Self {
        if mode == "release" {
            Self::default()
        } else {
            Self {
                format: LogFormat::Pretty,
                file_line_info: true,
                ..Self::default()
            }
        }
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Builds the event filter, preferring `RUST_LOG` over `level`.
pub fn env_filter(level: &str) -> TelemetryResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log level '{level}': {e}")))
}

/// Installs the global log subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the level does not parse or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = env_filter(&config.level)?;

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
