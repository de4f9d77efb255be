//! Reverse-proxy forwarder.
//!
//! The terminal stage of the pipeline. Resolves the matched route's service
//! to an endpoint, replays the request there with `reqwest`, and relays the
//! backend's status, headers and body unchanged.
//!
//! - No retries. One attempt per request, bounded by the client timeout.
//! - Hop-by-hop headers are dropped in both directions.
//! - Dropping the future returned by [`Forwarder::forward`] drops the
//!   in-flight backend call; hyper does this when the client disconnects.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use baribhara_core::GatewayError;
use baribhara_middleware::{Request, Response, ResponseExt};
use baribhara_router::RouteMatch;
use baribhara_telemetry::metrics::names::UPSTREAM_REQUESTS_TOTAL;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use http_body_util::{BodyExt, Full};
use reqwest::Client;

use crate::config::UpstreamSettings;
use crate::error::StartupResult;
use crate::registry::ServiceRegistry;

/// Headers that describe a single connection and are never forwarded.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Outbound client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Whole-request timeout for one backend call.
    pub timeout: Duration,
    /// Idle keep-alive connections kept per backend.
    pub pool_max_idle_per_host: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 100,
        }
    }
}

impl From<&UpstreamSettings> for ForwarderConfig {
    fn from(settings: &UpstreamSettings) -> Self {
        Self {
            timeout: settings.timeout,
            pool_max_idle_per_host: settings.pool_max_idle_per_host,
        }
    }
}

/// Where one request goes. Computed per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Logical service name.
    pub service: String,
    /// `host:port` of the backend.
    pub authority: String,
    /// Full URL including rewritten path and query.
    pub url: String,
}

/// Forwards matched requests to backend services.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    registry: Arc<ServiceRegistry>,
    config: ForwarderConfig,
}

impl Forwarder {
    /// Creates a forwarder over `registry`.
    pub fn new(registry: Arc<ServiceRegistry>, config: ForwarderConfig) -> StartupResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        Ok(Self {
            client,
            registry,
            config,
        })
    }

    /// Returns the service registry.
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Returns the client settings.
    #[must_use]
    pub fn config(&self) -> ForwarderConfig {
        self.config
    }

    /// Computes the backend URL for a matched route.
    pub fn resolve(
        &self,
        matched: &RouteMatch,
        query: Option<&str>,
    ) -> Result<ProxyTarget, GatewayError> {
        let service = matched.entry.service();
        let endpoint = self
            .registry
            .resolve(service)
            .ok_or_else(|| GatewayError::service_unavailable(service))?;

        let mut url = format!("{}{}", endpoint.base_url(), matched.target_path());
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        Ok(ProxyTarget {
            service: service.to_string(),
            authority: endpoint.authority(),
            url,
        })
    }

    /// Sends the request to its backend and returns the backend's response.
    pub async fn forward(
        &self,
        matched: &RouteMatch,
        request: Request,
    ) -> Result<Response, GatewayError> {
        let target = match self.resolve(matched, request.uri().query()) {
            Ok(target) => target,
            Err(e) => {
                record_outcome(matched.entry.service(), "unregistered");
                tracing::error!(
                    service = matched.entry.service(),
                    pattern = matched.entry.pattern(),
                    "no endpoint registered for service"
                );
                return Err(e);
            }
        };

        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        let mut headers = end_to_end_headers(&parts.headers);
        headers.remove(CONTENT_LENGTH);
        let host = HeaderValue::from_str(&target.authority)
            .map_err(|e| GatewayError::internal(format!("invalid upstream authority: {e}")))?;
        headers.insert(HOST, host);

        tracing::debug!(
            service = %target.service,
            method = %parts.method,
            url = %target.url,
            "forwarding request"
        );

        let upstream = self
            .client
            .request(parts.method, target.url.as_str())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| upstream_failure(&target, &e))?;

        let status = upstream.status();
        let upstream_headers = end_to_end_headers(upstream.headers());
        let body: Bytes = upstream
            .bytes()
            .await
            .map_err(|e| upstream_failure(&target, &e))?;

        record_outcome(&target.service, "ok");

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = upstream_headers;
        Ok(response)
    }

    /// Forwards the request, answering failures with the gateway's JSON
    /// error: `500` for an unregistered service, `502` for transport errors
    /// and timeouts.
    pub async fn handle(&self, matched: &RouteMatch, request: Request) -> Response {
        match self.forward(matched, request).await {
            Ok(response) => response,
            Err(error) => Response::from_error(&error),
        }
    }
}

fn upstream_failure(target: &ProxyTarget, error: &reqwest::Error) -> GatewayError {
    let outcome = if error.is_timeout() { "timeout" } else { "error" };
    record_outcome(&target.service, outcome);
    tracing::error!(
        service = %target.service,
        url = %target.url,
        outcome,
        error = %error,
        "upstream request failed"
    );
    GatewayError::upstream(&target.service, error.to_string())
}

fn record_outcome(service: &str, outcome: &'static str) {
    metrics::counter!(
        UPSTREAM_REQUESTS_TOTAL,
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Returns true for headers that must not cross the proxy.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copies `headers` minus hop-by-hop headers and any header named in
/// `Connection`. Repeated headers stay separate values.
pub fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_tokens: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut copied = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || connection_tokens.iter().any(|t| t == name.as_str()) {
            continue;
        }
        copied.append(name.clone(), value.clone());
    }
    copied
}

/// Appends the client address to `X-Forwarded-For`, joining earlier hops
/// into one comma-separated value.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let mut hops: Vec<String> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect();
    hops.push(client.to_string());

    if let Ok(value) = HeaderValue::from_str(&hops.join(", ")) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceEndpoint;
    use baribhara_router::RouteTable;
    use http::{Method, StatusCode};

    fn forwarder(registry: ServiceRegistry) -> Forwarder {
        Forwarder::new(
            Arc::new(registry),
            ForwarderConfig {
                timeout: Duration::from_secs(2),
                pool_max_idle_per_host: 1,
            },
        )
        .unwrap()
    }

    fn matched(path: &str) -> RouteMatch {
        RouteTable::builder()
            .authenticated(Method::GET, "/api/v1/users/:id", "user-service")
            .authenticated(Method::GET, "/api/v1/reports/invoices", "report-service")
            .build()
            .unwrap()
            .dispatch(&Method::GET, path)
            .unwrap()
    }

    fn request(path: &str) -> Request {
        http::Request::builder()
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn test_resolve_builds_url() {
        let mut registry = ServiceRegistry::new();
        registry.register("user-service", ServiceEndpoint::new("users.internal", 3002));
        let forwarder = forwarder(registry);

        let target = forwarder
            .resolve(&matched("/api/v1/users/42"), Some("expand=roles&x=1"))
            .unwrap();
        assert_eq!(target.service, "user-service");
        assert_eq!(target.authority, "users.internal:3002");
        assert_eq!(
            target.url,
            "http://users.internal:3002/api/v1/users/42?expand=roles&x=1"
        );

        let target = forwarder.resolve(&matched("/api/v1/users/42"), Some("")).unwrap();
        assert_eq!(target.url, "http://users.internal:3002/api/v1/users/42");
    }

    #[test]
    fn test_resolve_unregistered_service() {
        let forwarder = forwarder(ServiceRegistry::new());
        let err = forwarder
            .resolve(&matched("/api/v1/reports/invoices"), None)
            .unwrap_err();
        assert_eq!(err, GatewayError::service_unavailable("report-service"));
    }

    #[tokio::test]
    async fn test_handle_unregistered_service_is_500() {
        let forwarder = forwarder(ServiceRegistry::new());
        let response = forwarder
            .handle(&matched("/api/v1/reports/invoices"), request("/api/v1/reports/invoices"))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"error":"Service unavailable"}"#);
    }

    #[tokio::test]
    async fn test_handle_dead_backend_is_502() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut registry = ServiceRegistry::new();
        registry.register("user-service", ServiceEndpoint::new("127.0.0.1", port));

        let response = forwarder(registry)
            .handle(&matched("/api/v1/users/1"), request("/api/v1/users/1"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_end_to_end_headers() {
        let mut headers = HeaderMap::new();
        headers.append("connection", HeaderValue::from_static("keep-alive, X-Trace-Hop"));
        headers.append("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.append("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.append("x-trace-hop", HeaderValue::from_static("1"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));

        let copied = end_to_end_headers(&headers);

        assert_eq!(copied.len(), 3);
        assert!(!copied.contains_key("connection"));
        assert!(!copied.contains_key("x-trace-hop"));
        let tags: Vec<_> = copied.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn test_append_forwarded_for() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, IpAddr::from([10, 0, 0, 1]));
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1");

        headers.append("x-forwarded-for", HeaderValue::from_static("10.0.0.2"));
        append_forwarded_for(&mut headers, IpAddr::from([10, 0, 0, 3]));
        assert_eq!(
            headers.get_all("x-forwarded-for").iter().collect::<Vec<_>>(),
            vec!["10.0.0.1, 10.0.0.2, 10.0.0.3"]
        );
    }

    #[test]
    fn test_config_from_settings() {
        let config = ForwarderConfig::from(&UpstreamSettings::default());
        assert_eq!(config, ForwarderConfig::default());
    }
}
