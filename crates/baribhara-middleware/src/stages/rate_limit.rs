//! Distributed fixed-window rate limiting.
//!
//! Each client gets `limit` requests per `window`. Counters live in a
//! [`CounterStore`] shared by every gateway instance, keyed by client and
//! window index:
//!
//! ```text
//! rate_limit:{client}:{unix_secs / window_secs}
//! ```
//!
//! ## Algorithm
//!
//! 1. Read the current count. If the store fails, let the request through.
//! 2. If the count has reached the limit, reject with 429.
//! 3. Otherwise increment (INCR + EXPIRE in one transaction). If that fails,
//!    let the request through.
//!
//! The read and the increment are separate round trips, so concurrent
//! requests from one client can overshoot the limit slightly. That is
//! accepted; the store is never asked to do more than two commands per
//! request.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::store::CounterStore;
use crate::types::{Request, Response, ResponseExt};
use baribhara_core::GatewayError;
use http::HeaderValue;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
}

/// Default requests per window.
pub const DEFAULT_LIMIT: u64 = 100;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Request budget per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length; whole seconds are used.
    pub window: Duration,
}

impl RateLimitPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Within budget; the request was counted.
    Allowed {
        /// Requests left in this window.
        remaining: u64,
    },
    /// Budget exhausted for this window.
    Limited {
        /// Seconds the client should wait.
        retry_after: u64,
    },
    /// The store failed; the request goes through uncounted.
    Bypassed,
}

/// Fixed-window limiter over a [`CounterStore`].
///
/// # Example
///
/// ```
/// use baribhara_middleware::store::MemoryCounterStore;
/// use baribhara_middleware::stages::{RateLimitDecision, RateLimitPolicy, RateLimiter};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let limiter = RateLimiter::new(
///     Arc::new(MemoryCounterStore::new()),
///     RateLimitPolicy::new(1, Duration::from_secs(60)),
/// );
/// assert_eq!(limiter.check_at("10.0.0.1", 0).await, RateLimitDecision::Allowed { remaining: 0 });
/// assert_eq!(limiter.check_at("10.0.0.1", 1).await, RateLimitDecision::Limited { retry_after: 60 });
/// # });
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Returns the store key for a client at a point in time.
    #[must_use]
    pub fn key(&self, client: &str, unix_secs: u64) -> String {
        format!("rate_limit:{client}:{}", unix_secs / self.policy.window_secs())
    }

    /// Checks and counts one request from `client` now.
    pub async fn check(&self, client: &str) -> RateLimitDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        self.check_at(client, now).await
    }

    /// Checks and counts one request from `client` at `unix_secs`.
    pub async fn check_at(&self, client: &str, unix_secs: u64) -> RateLimitDecision {
        let key = self.key(client, unix_secs);

        let count = match self.store.get(&key).await {
            Ok(count) => count.unwrap_or(0),
            Err(e) => return self.bypass(client, "read", &e),
        };

        if count >= self.policy.limit {
            metrics::counter!("gateway_rate_limited_total").increment(1);
            tracing::debug!(client, count, limit = self.policy.limit, "rate limit exceeded");
            return RateLimitDecision::Limited {
                retry_after: self.policy.window_secs(),
            };
        }

        match self.store.increment(&key, self.policy.window).await {
            Ok(count) => RateLimitDecision::Allowed {
                remaining: self.policy.limit.saturating_sub(count),
            },
            Err(e) => self.bypass(client, "increment", &e),
        }
    }

    fn bypass(&self, client: &str, op: &str, error: &dyn std::error::Error) -> RateLimitDecision {
        metrics::counter!("gateway_rate_limit_store_errors_total").increment(1);
        tracing::warn!(
            client,
            op,
            store = self.store.name(),
            error = %error,
            "counter store unavailable, allowing request"
        );
        RateLimitDecision::Bypassed
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.name())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Decides which address identifies the caller.
///
/// The first `X-Forwarded-For` entry wins, then `X-Real-IP`, then the TCP
/// peer address, then `"unknown"`. Forwarded values are used only when they
/// parse as an IP address and the peer is a trusted proxy. With no trusted
/// proxies configured every peer is trusted.
#[derive(Debug, Clone, Default)]
pub struct ClientResolver {
    trusted_proxies: Arc<Vec<IpAddr>>,
}

impl ClientResolver {
    /// Creates a resolver that trusts forwarding headers from any peer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver that reads forwarding headers only from `proxies`.
    #[must_use]
    pub fn with_trusted_proxies(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            trusted_proxies: Arc::new(proxies.into_iter().collect()),
        }
    }

    /// Returns the configured proxies; empty means every peer is trusted.
    #[must_use]
    pub fn trusted_proxies(&self) -> &[IpAddr] {
        &self.trusted_proxies
    }

    fn trusts(&self, peer_addr: Option<SocketAddr>) -> bool {
        self.trusted_proxies.is_empty()
            || peer_addr.is_some_and(|peer| self.trusted_proxies.contains(&peer.ip()))
    }

    /// Returns the client key for a request.
    #[must_use]
    pub fn client_key(&self, request: &Request, peer_addr: Option<SocketAddr>) -> String {
        if self.trusts(peer_addr) {
            let header = |name: &str| {
                request
                    .headers()
                    .get(name)
                    .and_then(|value| value.to_str().ok())
            };
            let forwarded = header("x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok())
                .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()));
            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }
        peer_addr.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
    }
}

/// Rejects clients that exceeded their budget with 429.
///
/// Allowed responses carry `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: RateLimiter,
    clients: ClientResolver,
}

impl RateLimitMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            limiter,
            clients: ClientResolver::new(),
        }
    }

    /// Sets how the client key is derived when no earlier stage set it.
    #[must_use]
    pub fn with_client_resolver(mut self, clients: ClientResolver) -> Self {
        self.clients = clients;
        self
    }

    /// Returns the limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let client = match ctx.client().map(str::to_string) {
                Some(client) => client,
                None => {
                    let client = self.clients.client_key(&request, ctx.peer_addr());
                    ctx.set_client(client.clone());
                    client
                }
            };

            match self.limiter.check(&client).await {
                RateLimitDecision::Limited { retry_after } => {
                    Response::from_error(&GatewayError::RateLimitExceeded { retry_after })
                }
                RateLimitDecision::Allowed { remaining } => {
                    let mut response = next.run(ctx, request).await;
                    // Backend values of the same name are relayed as sent.
                    let headers = response.headers_mut();
                    if !headers.contains_key(headers::LIMIT) {
                        headers.insert(headers::LIMIT, HeaderValue::from(self.limiter.policy.limit));
                    }
                    if !headers.contains_key(headers::REMAINING) {
                        headers.insert(headers::REMAINING, HeaderValue::from(remaining));
                    }
                    response
                }
                RateLimitDecision::Bypassed => next.run(ctx, request).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCounterStore, StoreError};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full};

    struct FailingStore {
        fail_get: bool,
    }

    impl CounterStore for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<u64>, StoreError>> {
            let fail = self.fail_get;
            Box::pin(async move {
                if fail {
                    Err(StoreError::ConnectTimeout(Duration::from_secs(2)))
                } else {
                    Ok(None)
                }
            })
        }

        fn increment<'a>(
            &'a self,
            _key: &'a str,
            _ttl: Duration,
        ) -> BoxFuture<'a, Result<u64, StoreError>> {
            Box::pin(async { Err(StoreError::ConnectTimeout(Duration::from_secs(2))) })
        }
    }

    fn limiter(limit: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            RateLimitPolicy::new(limit, Duration::from_secs(60)),
        )
    }

    fn request() -> Request {
        http::Request::new(Full::new(Bytes::new()))
    }

    fn ok_next<'a>() -> Next<'a> {
        Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::OK) }))
    }

    #[test]
    fn test_key_uses_window_index() {
        let limiter = limiter(100);
        assert_eq!(limiter.key("1.2.3.4", 0), "rate_limit:1.2.3.4:0");
        assert_eq!(limiter.key("1.2.3.4", 59), "rate_limit:1.2.3.4:0");
        assert_eq!(limiter.key("1.2.3.4", 60), "rate_limit:1.2.3.4:1");
    }

    #[tokio::test]
    async fn test_hundred_allowed_then_limited() {
        let limiter = limiter(100);
        for i in 1..=100 {
            assert_eq!(
                limiter.check_at("c", 1_000).await,
                RateLimitDecision::Allowed { remaining: 100 - i }
            );
        }
        assert_eq!(
            limiter.check_at("c", 1_010).await,
            RateLimitDecision::Limited { retry_after: 60 }
        );
    }

    #[tokio::test]
    async fn test_new_window_resets_budget() {
        let limiter = limiter(1);
        assert!(matches!(limiter.check_at("c", 0).await, RateLimitDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("c", 30).await, RateLimitDecision::Limited { .. }));
        assert!(matches!(limiter.check_at("c", 60).await, RateLimitDecision::Allowed { .. }));
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = limiter(1);
        assert!(matches!(limiter.check_at("a", 0).await, RateLimitDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("b", 0).await, RateLimitDecision::Allowed { .. }));
    }

    #[tokio::test]
    async fn test_fails_open() {
        for fail_get in [true, false] {
            let limiter = RateLimiter::new(
                Arc::new(FailingStore { fail_get }),
                RateLimitPolicy::default(),
            );
            assert_eq!(limiter.check("c").await, RateLimitDecision::Bypassed);
        }
    }

    fn with_headers(pairs: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder();
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    #[test]
    fn test_client_key_precedence() {
        let peer: SocketAddr = "198.51.100.4:5000".parse().unwrap();
        let clients = ClientResolver::new();

        let forwarded = with_headers(&[
            ("x-forwarded-for", "203.0.113.1, 10.0.0.1"),
            ("x-real-ip", "203.0.113.2"),
        ]);
        assert_eq!(clients.client_key(&forwarded, Some(peer)), "203.0.113.1");

        let real_ip = with_headers(&[("x-real-ip", "203.0.113.2")]);
        assert_eq!(clients.client_key(&real_ip, Some(peer)), "203.0.113.2");

        assert_eq!(clients.client_key(&request(), Some(peer)), "198.51.100.4");
        assert_eq!(clients.client_key(&request(), None), "unknown");
    }

    #[test]
    fn test_client_key_ignores_non_ip_forwarding() {
        let peer: SocketAddr = "198.51.100.4:5000".parse().unwrap();
        let clients = ClientResolver::new();

        let spoofed = with_headers(&[("x-forwarded-for", "fresh-budget-42")]);
        assert_eq!(clients.client_key(&spoofed, Some(peer)), "198.51.100.4");

        let fallback = with_headers(&[
            ("x-forwarded-for", "nonsense"),
            ("x-real-ip", "2001:db8::1"),
        ]);
        assert_eq!(clients.client_key(&fallback, Some(peer)), "2001:db8::1");
    }

    #[test]
    fn test_client_key_untrusted_peer() {
        let proxy: SocketAddr = "10.0.0.5:4000".parse().unwrap();
        let stranger: SocketAddr = "198.51.100.4:5000".parse().unwrap();
        let clients = ClientResolver::with_trusted_proxies([proxy.ip()]);
        let forwarded = with_headers(&[("x-forwarded-for", "203.0.113.1")]);

        assert_eq!(clients.client_key(&forwarded, Some(proxy)), "203.0.113.1");
        assert_eq!(clients.client_key(&forwarded, Some(stranger)), "198.51.100.4");
        assert_eq!(clients.client_key(&forwarded, None), "unknown");
    }

    #[tokio::test]
    async fn test_middleware_keeps_backend_rate_headers() {
        let stage = RateLimitMiddleware::new(limiter(100));
        let mut ctx = MiddlewareContext::new();
        ctx.set_client("c");
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let mut response = Response::empty(StatusCode::OK);
                response
                    .headers_mut()
                    .insert(headers::LIMIT, HeaderValue::from_static("5000"));
                response
            })
        });

        let response = stage.process(&mut ctx, request(), next).await;
        assert_eq!(response.headers().get(headers::LIMIT).unwrap(), "5000");
        assert_eq!(response.headers().get(headers::REMAINING).unwrap(), "99");
    }

    #[tokio::test]
    async fn test_middleware_rejects_with_429() {
        let stage = RateLimitMiddleware::new(limiter(1));
        let mut ctx = MiddlewareContext::new();
        ctx.set_client("c");

        let first = stage.process(&mut ctx, request(), ok_next()).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get(headers::LIMIT).unwrap(), "1");
        assert_eq!(first.headers().get(headers::REMAINING).unwrap(), "0");

        let second = stage.process(&mut ctx, request(), ok_next()).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(http::header::RETRY_AFTER).unwrap(), "60");
        let bytes = second.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "error": "Rate limit exceeded", "retry_after": 60 })
        );
    }

    #[tokio::test]
    async fn test_middleware_bypass_adds_no_headers() {
        let stage = RateLimitMiddleware::new(RateLimiter::new(
            Arc::new(FailingStore { fail_get: true }),
            RateLimitPolicy::default(),
        ));
        let mut ctx = MiddlewareContext::new();

        let response = stage.process(&mut ctx, request(), ok_next()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(headers::LIMIT).is_none());
        assert_eq!(ctx.client(), Some("unknown"));
    }
}
