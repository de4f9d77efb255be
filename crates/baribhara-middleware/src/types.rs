//! Request and response types used throughout the pipeline.

use baribhara_core::{ErrorBody, GatewayError};
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;

/// The HTTP request type used in the pipeline.
///
/// The inbound body is collected before the pipeline runs, so stages and the
/// forwarder always see a complete `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Extension trait for building gateway-generated responses.
pub trait ResponseExt {
    /// Creates a JSON response carrying an [`ErrorBody`].
    fn json_error(status: StatusCode, body: &ErrorBody) -> Response;

    /// Creates the response for a [`GatewayError`].
    ///
    /// Rate-limit rejections also carry a `Retry-After` header.
    fn from_error(error: &GatewayError) -> Response;

    /// Creates an empty response with the given status.
    fn empty(status: StatusCode) -> Response;
}

impl ResponseExt for Response {
    fn json_error(status: StatusCode, body: &ErrorBody) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::from(body.to_json())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }

    fn from_error(error: &GatewayError) -> Response {
        let mut response = Self::json_error(error.status_code(), &error.to_body());
        if let GatewayError::RateLimitExceeded { retry_after } = error {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }
        response
    }

    fn empty(status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }
}
