//! Gateway HTTP server.
//!
//! Accepts connections, answers `/health` and the metrics endpoint itself,
//! and runs every other request through the stage pipeline into the
//! forwarder:
//!
//! ```text
//! Recovery → RequestLogging → Cors → RateLimit → Dispatch[→ Authentication → AdminGuard] → Forwarder
//! ```

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use baribhara_core::GatewayError;
use baribhara_middleware::stages::{
    AllowedOrigins, AuthenticationMiddleware, ClientResolver, CorsMiddleware, DispatchMiddleware,
    JwtValidator, RateLimitMiddleware, RateLimitPolicy, RateLimiter, RecoveryMiddleware,
    RequestLoggingMiddleware,
};
use baribhara_middleware::{
    CounterStore, MemoryCounterStore, MiddlewareContext, Pipeline, RedisCounterStore,
    RedisSettings, Request, Response, ResponseExt,
};
use baribhara_router::{RouteMatch, RouteTable};
use baribhara_telemetry::{init_metrics, InFlightGuard, MetricsRegistry};
use bytes::Bytes;
use http::{header, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::{GatewayConfig, RateLimitBackend};
use crate::error::{GatewayStartupError, StartupResult};
use crate::health::{health_response, HEALTH_PATH};
use crate::proxy::{append_forwarded_for, Forwarder, ForwarderConfig};
use crate::registry::ServiceRegistry;
use crate::routes;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// The API gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<ServerState>,
}

struct ServerState {
    pipeline: Pipeline,
    forwarder: Arc<Forwarder>,
    metrics: Option<MetricsRegistry>,
    metrics_path: String,
}

impl GatewayServer {
    /// Builds the registry, forwarder, counter store, route table and
    /// pipeline from `config`. Does not bind.
    ///
    /// `config` is used as given; call [`GatewayConfig::validate`] first.
    pub fn new(config: GatewayConfig) -> StartupResult<Self> {
        let registry = Arc::new(ServiceRegistry::from_config(&config.services));
        let forwarder = Arc::new(Forwarder::new(
            Arc::clone(&registry),
            ForwarderConfig::from(&config.upstream),
        )?);

        let table = Arc::new(routes::catalogue()?);
        warn_unregistered(&table, &registry);

        let pipeline = build_pipeline(&config, table)?;
        let metrics = init_metrics(&config.metrics_config())?;

        info!(
            services = registry.len(),
            stages = ?pipeline.stage_names(),
            rate_limit_backend = ?config.rate_limit.backend,
            "gateway initialized"
        );

        let state = Arc::new(ServerState {
            pipeline,
            forwarder,
            metrics,
            metrics_path: config.metrics.path.clone(),
        });

        Ok(Self { config, state })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns the stage pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.state.pipeline
    }

    /// Returns the forwarder.
    #[must_use]
    pub fn forwarder(&self) -> &Forwarder {
        &self.state.forwarder
    }

    /// The address the server listens on.
    pub fn socket_addr(&self) -> StartupResult<SocketAddr> {
        let server = &self.config.server;
        let ip: IpAddr = server
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| GatewayStartupError::Address {
                addr: server.listen_addr.clone(),
                reason: e.to_string(),
            })?;
        Ok(SocketAddr::new(ip, server.port))
    }

    /// Binds the listener.
    pub async fn bind(&self) -> StartupResult<TcpListener> {
        let addr = self.socket_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayStartupError::Bind { addr, source })
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(self) -> StartupResult<()> {
        self.run_with_shutdown(ShutdownSignal::from_os_signals()).await
    }

    /// Binds and runs until `shutdown` is triggered.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> StartupResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Accepts connections on `listener` until `shutdown` is triggered, then
    /// waits up to `server.shutdown_timeout` for open connections to finish.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> StartupResult<()> {
        match listener.local_addr() {
            Ok(addr) => info!(%addr, mode = %self.config.server.mode, "gateway listening"),
            Err(e) => warn!(error = %e, "gateway listening on unknown address"),
        }

        let read_timeout = self.config.server.read_timeout;
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let token = tracker.track();
                        let state = Arc::clone(&self.state);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            serve_connection(state, stream, peer, read_timeout, shutdown).await;
                            drop(token);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.wait() => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        let timeout = self.config.server.shutdown_timeout;
        info!(
            active = tracker.active(),
            timeout = ?timeout,
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.drained()).await.is_ok() {
            info!("all connections closed");
        } else {
            warn!(active = tracker.active(), "shutdown timeout elapsed with open connections");
        }

        info!("gateway stopped");
        Ok(())
    }
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("pipeline", &self.state.pipeline)
            .field("metrics", &self.state.metrics.is_some())
            .finish_non_exhaustive()
    }
}

fn build_pipeline(config: &GatewayConfig, table: Arc<RouteTable>) -> StartupResult<Pipeline> {
    let store: Arc<dyn CounterStore> = match config.rate_limit.backend {
        RateLimitBackend::Redis => {
            Arc::new(RedisCounterStore::new(&RedisSettings::from(&config.redis))?)
        }
        RateLimitBackend::Memory => Arc::new(MemoryCounterStore::new()),
    };
    let limiter = RateLimiter::new(
        store,
        RateLimitPolicy::new(config.rate_limit.requests, config.rate_limit.window),
    );

    let clients =
        ClientResolver::with_trusted_proxies(config.rate_limit.trusted_proxies.iter().copied());

    let cors = CorsMiddleware::builder()
        .origins(AllowedOrigins::from_config(
            config.cors.allowed_origins.iter().cloned(),
        ))
        .allow_credentials(config.cors.allow_credentials)
        .build();

    let authentication = AuthenticationMiddleware::new(JwtValidator::new(&config.jwt.secret));

    Ok(Pipeline::builder()
        .stage(RecoveryMiddleware::new())
        .stage(RequestLoggingMiddleware::new().with_client_resolver(clients.clone()))
        .stage(cors)
        .stage(RateLimitMiddleware::new(limiter).with_client_resolver(clients))
        .stage(DispatchMiddleware::new(table, authentication))
        .build())
}

fn warn_unregistered(table: &RouteTable, registry: &ServiceRegistry) {
    let missing: BTreeSet<&str> = table
        .entries()
        .iter()
        .map(|entry| entry.service())
        .filter(|service| !registry.contains(service))
        .collect();
    if !missing.is_empty() {
        warn!(
            services = ?missing,
            "routes reference services with no endpoint and will answer 500"
        );
    }
}

async fn serve_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
    read_timeout: Duration,
    shutdown: ShutdownSignal,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request: http::Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { Ok::<_, Infallible>(state.handle(request, peer).await) }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout)
        .serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.wait() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

impl ServerState {
    async fn handle(&self, request: http::Request<Incoming>, peer: SocketAddr) -> Response {
        let _in_flight = InFlightGuard::new();

        if request.method() == Method::GET {
            let path = request.uri().path();
            if path == HEALTH_PATH {
                return health_response();
            }
            if let Some(metrics) = &self.metrics {
                if path == self.metrics_path {
                    return metrics_response(metrics);
                }
            }
        }

        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(%peer, error = %e, "failed to read request body");
                return Response::from_error(&GatewayError::BadRequest {
                    reason: e.to_string(),
                });
            }
        };
        let request: Request = http::Request::from_parts(parts, Full::new(body));

        let forwarder = Arc::clone(&self.forwarder);
        self.pipeline
            .process(
                MiddlewareContext::with_peer_addr(peer),
                request,
                move |ctx, mut request| {
                    let matched = ctx.remove_extension::<RouteMatch>();
                    if let Some(peer) = ctx.peer_addr() {
                        append_forwarded_for(request.headers_mut(), peer.ip());
                    }
                    Box::pin(async move {
                        match matched {
                            Some(matched) => forwarder.handle(&matched, request).await,
                            None => Response::from_error(&GatewayError::internal(
                                "request reached the forwarder without a route",
                            )),
                        }
                    })
                },
            )
            .await
    }
}

fn metrics_response(registry: &MetricsRegistry) -> Response {
    let mut response = Response::new(Full::new(Bytes::from(registry.render())));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
