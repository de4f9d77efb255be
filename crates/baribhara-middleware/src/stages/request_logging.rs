//! Request logging stage.
//!
//! Settles the request ID and the client key, runs the rest of the
//! pipeline, then emits one structured event and the request metrics.
//!
//! # Request ID
//!
//! An inbound `X-Request-ID` that parses as a UUID is kept; anything else is
//! replaced with a fresh UUID v7. The ID is always echoed on the response.
//!
//! # Metrics
//!
//! - `gateway_requests_total{method,status}`
//! - `gateway_request_duration_seconds{method}`

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::rate_limit::ClientResolver;
use crate::types::{Request, Response};
use baribhara_core::RequestId;
use http::HeaderValue;
use std::time::Instant;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logs every request and records request metrics.
#[derive(Debug, Clone, Default)]
pub struct RequestLoggingMiddleware {
    clients: ClientResolver,
}

impl RequestLoggingMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how the client key is derived.
    #[must_use]
    pub fn with_client_resolver(mut self, clients: ClientResolver) -> Self {
        self.clients = clients;
        self
    }

    fn inbound_request_id(request: &Request) -> Option<RequestId> {
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }
}

impl Middleware for RequestLoggingMiddleware {
    fn name(&self) -> &'static str {
        "request_logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let started = Instant::now();
            let request_id = Self::inbound_request_id(&request).unwrap_or_else(RequestId::new);
            ctx.set_request_id(request_id);
            ctx.set_client(self.clients.client_key(&request, ctx.peer_addr()));

            let method = request.method().clone();
            let path = request.uri().path().to_string();

            let mut response = next.run(ctx, request).await;

            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            let elapsed = started.elapsed();
            let status = response.status();
            let client = ctx.client().unwrap_or("unknown");
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;

            if status.is_server_error() {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    client = %client,
                    status = status.as_u16(),
                    duration_ms,
                    "request failed"
                );
            } else {
                tracing::info!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    client = %client,
                    status = status.as_u16(),
                    duration_ms,
                    "request completed"
                );
            }

            metrics::counter!(
                "gateway_requests_total",
                "method" => method.to_string(),
                "status" => status.as_u16().to_string()
            )
            .increment(1);
            metrics::histogram!(
                "gateway_request_duration_seconds",
                "method" => method.to_string()
            )
            .record(elapsed.as_secs_f64());

            response
        })
    }
}
