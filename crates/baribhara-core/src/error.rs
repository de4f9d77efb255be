//! Error types for the gateway.
//!
//! Every failure a request can hit inside the gateway is a [`GatewayError`].
//! Each variant belongs to exactly one [`ErrorKind`], and the kind decides the
//! HTTP status and the caller-visible message. The `Display` output of
//! [`GatewayError`] is meant for logs and may carry internal detail (service
//! names, transport errors) that is never sent to the caller.
//!
//! | `ErrorKind` | Status | Caller message |
//! |---|---|---|
//! | `MissingCredentials` | 401 | Authorization header required |
//! | `MalformedCredentials` | 401 | Bearer token required |
//! | `InvalidCredentials` | 401 | Invalid token |
//! | `Forbidden` | 403 | Admin access required |
//! | `RateLimitExceeded` | 429 | Rate limit exceeded |
//! | `NoRoute` | 404 | Not found |
//! | `BadRequest` | 400 | Failed to read request body |
//! | `ServiceUnavailable` | 500 | Service unavailable |
//! | `UpstreamError` | 502 | Service unavailable |
//! | `Internal` | 500 | Internal server error |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`GatewayError`].
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classification of gateway errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No `Authorization` header on a protected route.
    MissingCredentials,
    /// `Authorization` header not of the form `Bearer <token>`.
    MalformedCredentials,
    /// Bad signature, expired token, or unparsable claims.
    InvalidCredentials,
    /// Caller is not an administrator.
    Forbidden,
    /// Per-client request budget exhausted.
    RateLimitExceeded,
    /// No route matches the method and path.
    NoRoute,
    /// The inbound request could not be read.
    BadRequest,
    /// The route names a service with no registered endpoint.
    ServiceUnavailable,
    /// The backend could not be reached or did not answer in time.
    UpstreamError,
    /// Unexpected failure inside the gateway.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status for this kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredentials | Self::MalformedCredentials | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::NoRoute => StatusCode::NOT_FOUND,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the message shown to the caller.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "Authorization header required",
            Self::MalformedCredentials => "Bearer token required",
            Self::InvalidCredentials => "Invalid token",
            Self::Forbidden => "Admin access required",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::NoRoute => "Not found",
            Self::BadRequest => "Failed to read request body",
            Self::ServiceUnavailable | Self::UpstreamError => "Service unavailable",
            Self::Internal => "Internal server error",
        }
    }

    /// Returns a stable snake_case label, used as a metric and log field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::MalformedCredentials => "malformed_credentials",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Forbidden => "forbidden",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::NoRoute => "no_route",
            Self::BadRequest => "bad_request",
            Self::ServiceUnavailable => "service_unavailable",
            Self::UpstreamError => "upstream_error",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-request gateway failure.
///
/// None of these are retried and none are fatal to the process; each one
/// terminates only the request that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No `Authorization` header was supplied.
    #[error("authorization header missing")]
    MissingCredentials,

    /// The `Authorization` header is not a bearer credential.
    #[error("authorization header is not a bearer credential")]
    MalformedCredentials,

    /// The bearer token failed verification.
    #[error("bearer token rejected: {reason}")]
    InvalidCredentials {
        /// Why verification failed (logged, never returned).
        reason: String,
    },

    /// The caller lacks the admin role.
    #[error("admin role required")]
    Forbidden,

    /// The client exhausted its request budget for the current window.
    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded {
        /// Seconds the caller should wait before retrying.
        retry_after: u64,
    },

    /// No route matched.
    #[error("no route for {method} {path}")]
    NoRoute {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// The inbound body could not be read.
    #[error("failed to read request body: {reason}")]
    BadRequest {
        /// Underlying I/O error.
        reason: String,
    },

    /// The matched route targets a service with no registered endpoint.
    #[error("no endpoint registered for service '{service}'")]
    ServiceUnavailable {
        /// Logical service name.
        service: String,
    },

    /// Transport failure or timeout talking to the backend.
    #[error("upstream '{service}' failed: {reason}")]
    UpstreamError {
        /// Logical service name.
        service: String,
        /// Transport error description.
        reason: String,
    },

    /// Unexpected internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description for the logs.
        message: String,
    },
}

impl GatewayError {
    /// Creates a [`GatewayError::InvalidCredentials`] error.
    #[must_use]
    pub fn invalid_credentials(reason: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            reason: reason.into(),
        }
    }

    /// Creates a [`GatewayError::NoRoute`] error.
    #[must_use]
    pub fn no_route(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NoRoute {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Creates a [`GatewayError::ServiceUnavailable`] error.
    #[must_use]
    pub fn service_unavailable(service: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
        }
    }

    /// Creates a [`GatewayError::UpstreamError`] error.
    #[must_use]
    pub fn upstream(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamError {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`GatewayError::Internal`] error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredentials => ErrorKind::MissingCredentials,
            Self::MalformedCredentials => ErrorKind::MalformedCredentials,
            Self::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::NoRoute { .. } => ErrorKind::NoRoute,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::UpstreamError { .. } => ErrorKind::UpstreamError,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Builds the JSON body sent to the caller.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let retry_after = match self {
            Self::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        };
        ErrorBody {
            error: self.kind().message().to_string(),
            retry_after,
        }
    }
}

/// JSON error body: `{"error": "..."}`, plus `retry_after` on rate-limit
/// rejections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Caller-visible message.
    pub error: String,

    /// Seconds until the client may retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    /// Creates a body with only an error message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_after: None,
        }
    }

    /// Serializes the body to JSON bytes.
    #[must_use]
    pub fn to_json(&self) -> Vec<u8> {
        // A struct of a string and an optional integer always serializes.
        serde_json::to_vec(self).unwrap_or_else(|_| br#"{"error":"Internal server error"}"#.to_vec())
    }
}
