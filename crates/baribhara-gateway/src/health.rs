//! Liveness endpoint.

use baribhara_middleware::Response;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};

use crate::VERSION;

/// Path answered by [`health_response`].
pub const HEALTH_PATH: &str = "/health";

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "api-gateway";

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: String,
    /// RFC 3339 UTC time the response was produced.
    pub timestamp: String,
    /// Service name.
    pub service: String,
    /// Crate version.
    pub version: String,
}

impl HealthResponse {
    /// Builds a response stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            service: SERVICE_NAME.to_string(),
            version: VERSION.to_string(),
        }
    }
}

/// Renders the health response.
pub fn health_response() -> Response {
    let body = serde_json::to_vec(&HealthResponse::now()).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
