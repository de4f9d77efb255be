//! Prometheus metrics for the gateway.
//!
//! The recorder is installed without its own HTTP listener; the gateway
//! serves [`MetricsRegistry::render`] on its metrics path.
//!
//! # Gateway Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `gateway_requests_total` | Counter | `method`, `status` |
//! | `gateway_request_duration_seconds` | Histogram | `method` |
//! | `gateway_in_flight_requests` | Gauge | - |
//! | `gateway_rate_limited_total` | Counter | - |
//! | `gateway_rate_limit_store_errors_total` | Counter | - |
//! | `gateway_upstream_requests_total` | Counter | `service`, `outcome` |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names.
pub mod names {
    /// Requests completed, by method and status.
    pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
    /// Request latency.
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    /// Requests currently being served.
    pub const IN_FLIGHT_REQUESTS: &str = "gateway_in_flight_requests";
    /// Requests rejected with 429.
    pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
    /// Counter store failures that let a request through.
    pub const RATE_LIMIT_STORE_ERRORS_TOTAL: &str = "gateway_rate_limit_store_errors_total";
    /// Forwarded requests, by service and outcome.
    pub const UPSTREAM_REQUESTS_TOTAL: &str = "gateway_upstream_requests_total";
}

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

/// Handle to the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Installs the Prometheus recorder, or returns the one already installed.
///
/// Returns `Ok(None)` when metrics are disabled.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` for empty buckets and
/// `TelemetryError::MetricsInit` if another recorder is installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(Some(MetricsRegistry {
            handle: handle.clone(),
        }));
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
    register_metric_descriptions();

    Ok(Some(MetricsRegistry { handle }))
}

fn register_metric_descriptions() {
    describe_counter!(names::REQUESTS_TOTAL, "Total number of requests handled by the gateway");
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Request duration in seconds, including the upstream call"
    );
    describe_gauge!(names::IN_FLIGHT_REQUESTS, "Requests currently being served");
    describe_counter!(names::RATE_LIMITED_TOTAL, "Requests rejected by the rate limiter");
    describe_counter!(
        names::RATE_LIMIT_STORE_ERRORS_TOTAL,
        "Counter store failures that let a request through"
    );
    describe_counter!(
        names::UPSTREAM_REQUESTS_TOTAL,
        "Requests forwarded to backend services, by outcome"
    );
}

/// Tracks one in-flight request; decrements the gauge on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}
