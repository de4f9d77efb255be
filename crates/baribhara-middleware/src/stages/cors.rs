//! CORS (Cross-Origin Resource Sharing) stage.
//!
//! Answers preflight requests itself and decorates every other response
//! with the CORS headers a browser needs. Preflights never reach the rate
//! limiter or a backend.
//!
//! ## Preflight Requests
//!
//! An `OPTIONS` request carrying both `Origin` and
//! `Access-Control-Request-Method` is a preflight. If the origin, method and
//! requested headers are all allowed the stage replies `204 No Content` with
//! the allow lists; otherwise `403` with a JSON error.
//!
//! ## Example
//!
//! ```
//! use baribhara_middleware::stages::CorsMiddleware;
//! use std::time::Duration;
//!
//! let cors = CorsMiddleware::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_credentials(true)
//!     .max_age(Duration::from_secs(600))
//!     .build();
//! assert!(cors.origins().is_allowed("https://app.example.com"));
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use baribhara_core::ErrorBody;
use http::{HeaderValue, Method, StatusCode};
use std::collections::BTreeSet;
use std::time::Duration;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// The set of allowed origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Exactly these origins.
    List(BTreeSet<String>),
}

impl AllowedOrigins {
    /// Builds the set from configured values; a `*` entry allows any origin.
    pub fn from_config<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: BTreeSet<String> = origins.into_iter().map(Into::into).collect();
        if list.contains("*") {
            Self::Any
        } else {
            Self::List(list)
        }
    }

    /// Checks if an origin is allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }
}

#[derive(Debug, Clone)]
struct CorsPolicy {
    origins: AllowedOrigins,
    methods: Vec<Method>,
    allow_headers: BTreeSet<String>,
    expose_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allow_headers: ["authorization", "content-type", "x-request-id"]
                .into_iter()
                .map(String::from)
                .collect(),
            expose_headers: [
                "retry-after",
                "x-ratelimit-limit",
                "x-ratelimit-remaining",
                "x-request-id",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

/// Builder for [`CorsMiddleware`].
///
/// Starts from: any origin, the REST methods, `authorization`,
/// `content-type` and `x-request-id` request headers, a 24 hour preflight
/// cache, no credentials.
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    policy: CorsPolicy,
}

impl CorsBuilder {
    /// Creates a builder with the defaults above.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the allowed origins.
    #[must_use]
    pub fn origins(mut self, origins: AllowedOrigins) -> Self {
        self.policy.origins = origins;
        self
    }

    /// Adds an allowed origin, switching from "any" to an explicit list.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        match &mut self.policy.origins {
            AllowedOrigins::Any => {
                self.policy.origins = AllowedOrigins::List(BTreeSet::from([origin.into()]));
            }
            AllowedOrigins::List(origins) => {
                origins.insert(origin.into());
            }
        }
        self
    }

    /// Sets the allowed methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.policy.methods = methods.into_iter().collect();
        self
    }

    /// Sets the allowed request headers. `*` allows any.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.allow_headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Sets the response headers scripts may read.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.expose_headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Sets whether credentials are allowed.
    ///
    /// With credentials and any origin, the request's origin is echoed
    /// instead of `*`, which browsers reject in that combination.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.policy.allow_credentials = allow;
        self
    }

    /// Sets the preflight cache lifetime.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.policy.max_age = Some(duration);
        self
    }

    /// Builds the stage.
    #[must_use]
    pub fn build(self) -> CorsMiddleware {
        CorsMiddleware {
            policy: self.policy,
        }
    }
}

/// Handles preflight requests and adds CORS response headers.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    policy: CorsPolicy,
}

impl CorsMiddleware {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Returns the allowed origins.
    #[must_use]
    pub fn origins(&self) -> &AllowedOrigins {
        &self.policy.origins
    }

    fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(headers::ORIGIN)
            && request.headers().contains_key(headers::REQUEST_METHOD)
    }

    fn origin(request: &Request) -> Option<&str> {
        request
            .headers()
            .get(headers::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    fn allow_origin_value(&self, origin: &str) -> Option<HeaderValue> {
        match &self.policy.origins {
            AllowedOrigins::Any if !self.policy.allow_credentials => {
                Some(HeaderValue::from_static("*"))
            }
            origins if origins.is_allowed(origin) => HeaderValue::from_str(origin).ok(),
            _ => None,
        }
    }

    fn check_preflight(&self, request: &Request) -> Result<HeaderValue, &'static str> {
        let origin = Self::origin(request).ok_or("Origin not allowed")?;
        let allow_origin = self
            .allow_origin_value(origin)
            .ok_or("Origin not allowed")?;

        let method_allowed = request
            .headers()
            .get(headers::REQUEST_METHOD)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Method>().ok())
            .is_some_and(|m| self.policy.methods.contains(&m));
        if !method_allowed {
            return Err("Method not allowed");
        }

        if !self.policy.allow_headers.contains("*") {
            let requested = request
                .headers()
                .get(headers::REQUEST_HEADERS)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let all_allowed = requested
                .split(',')
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .all(|h| self.policy.allow_headers.contains(&h));
            if !all_allowed {
                return Err("Header not allowed");
            }
        }

        Ok(allow_origin)
    }

    fn preflight_response(&self, allow_origin: HeaderValue) -> Response {
        let mut response = Response::empty(StatusCode::NO_CONTENT);
        let headers = response.headers_mut();
        headers.insert(headers::ALLOW_ORIGIN, allow_origin);

        let methods = join(self.policy.methods.iter().map(Method::as_str));
        if let Ok(value) = HeaderValue::from_str(&methods) {
            headers.insert(headers::ALLOW_METHODS, value);
        }
        let allow_headers = join(self.policy.allow_headers.iter().map(String::as_str));
        if let Ok(value) = HeaderValue::from_str(&allow_headers) {
            headers.insert(headers::ALLOW_HEADERS, value);
        }
        if self.policy.allow_credentials {
            headers.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(max_age) = self.policy.max_age {
            headers.insert(headers::MAX_AGE, HeaderValue::from(max_age.as_secs()));
        }
        headers.insert(
            headers::VARY,
            HeaderValue::from_static("Origin, Access-Control-Request-Method, Access-Control-Request-Headers"),
        );
        response
    }

    fn decorate(&self, response: &mut Response, allow_origin: HeaderValue) {
        let headers = response.headers_mut();
        headers.insert(headers::ALLOW_ORIGIN, allow_origin);
        if self.policy.allow_credentials {
            headers.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if !self.policy.expose_headers.is_empty() {
            let expose = join(self.policy.expose_headers.iter().map(String::as_str));
            if let Ok(value) = HeaderValue::from_str(&expose) {
                headers.insert(headers::EXPOSE_HEADERS, value);
            }
        }
        headers.append(headers::VARY, HeaderValue::from_static("Origin"));
    }
}

fn join<'s>(items: impl Iterator<Item = &'s str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if Self::is_preflight(&request) {
                return match self.check_preflight(&request) {
                    Ok(allow_origin) => self.preflight_response(allow_origin),
                    Err(reason) => {
                        tracing::debug!(
                            request_id = %ctx.request_id(),
                            origin = Self::origin(&request).unwrap_or(""),
                            reason,
                            "preflight rejected"
                        );
                        Response::json_error(StatusCode::FORBIDDEN, &ErrorBody::new(reason))
                    }
                };
            }

            let allow_origin = Self::origin(&request).and_then(|o| self.allow_origin_value(o));
            let mut response = next.run(ctx, request).await;
            if let Some(allow_origin) = allow_origin {
                self.decorate(&mut response, allow_origin);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;

    fn with_origin(method: Method, origin: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri("/api/v1/users")
            .header(headers::ORIGIN, origin)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn preflight(origin: &str, method: &str, request_headers: Option<&str>) -> Request {
        let mut builder = http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/users")
            .header(headers::ORIGIN, origin)
            .header(headers::REQUEST_METHOD, method);
        if let Some(h) = request_headers {
            builder = builder.header(headers::REQUEST_HEADERS, h);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn ok_next<'a>() -> Next<'a> {
        Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::OK) }))
    }

    fn teapot_next<'a>() -> Next<'a> {
        Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::IM_A_TEAPOT) }))
    }

    #[test]
    fn test_origins_from_config() {
        assert_eq!(AllowedOrigins::from_config(["*"]), AllowedOrigins::Any);
        let list = AllowedOrigins::from_config(["https://a.example", "https://b.example"]);
        assert!(list.is_allowed("https://a.example"));
        assert!(!list.is_allowed("https://evil.example"));
    }

    #[tokio::test]
    async fn test_preflight_answered_without_next() {
        let cors = CorsMiddleware::builder().build();
        let mut ctx = MiddlewareContext::new();

        let response = cors
            .process(&mut ctx, preflight("https://app.example", "POST", Some("Authorization, Content-Type")), teapot_next())
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers().get(headers::ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(response.headers().get(headers::MAX_AGE).unwrap(), "86400");
        assert!(response
            .headers()
            .get(headers::ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("DELETE"));
    }

    #[tokio::test]
    async fn test_preflight_rejections() {
        let cors = CorsMiddleware::builder()
            .allow_origin("https://app.example")
            .allow_methods([Method::GET])
            .build();

        for request in [
            preflight("https://evil.example", "GET", None),
            preflight("https://app.example", "DELETE", None),
            preflight("https://app.example", "GET", Some("X-Forbidden")),
        ] {
            let mut ctx = MiddlewareContext::new();
            let response = cors.process(&mut ctx, request, teapot_next()).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn test_credentials_echo_origin() {
        let cors = CorsMiddleware::builder().allow_credentials(true).build();
        let mut ctx = MiddlewareContext::new();

        let response = cors
            .process(&mut ctx, with_origin(Method::GET, "https://app.example"), ok_next())
            .await;

        assert_eq!(
            response.headers().get(headers::ALLOW_ORIGIN).unwrap(),
            "https://app.example"
        );
        assert_eq!(response.headers().get(headers::ALLOW_CREDENTIALS).unwrap(), "true");
    }

    #[tokio::test]
    async fn test_simple_request_decorated() {
        let cors = CorsMiddleware::builder().build();
        let mut ctx = MiddlewareContext::new();

        let response = cors
            .process(&mut ctx, with_origin(Method::GET, "https://app.example"), ok_next())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(headers::ALLOW_ORIGIN).unwrap(), "*");
        assert!(response
            .headers()
            .get(headers::EXPOSE_HEADERS)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("x-request-id"));
        assert_eq!(response.headers().get(headers::VARY).unwrap(), "Origin");
    }

    #[tokio::test]
    async fn test_disallowed_origin_not_decorated() {
        let cors = CorsMiddleware::builder().allow_origin("https://app.example").build();
        let mut ctx = MiddlewareContext::new();

        let response = cors
            .process(&mut ctx, with_origin(Method::GET, "https://evil.example"), ok_next())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(headers::ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_options_without_preflight_headers_passes_through() {
        let cors = CorsMiddleware::builder().build();
        let mut ctx = MiddlewareContext::new();
        let request = http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/users")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = cors.process(&mut ctx, request, teapot_next()).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
