//! Baribhara API gateway.
//!
//! The single public entry point in front of the property-management
//! backend services. Every request passes an ordered stage pipeline and is
//! then forwarded to the service its route names:
//!
//! ```text
//!             ┌───────────────────────── baribhara-gateway ─────────────────────────┐
//!  client ──► │ Recovery → Logging → CORS → RateLimit → Dispatch ─► Forwarder ──────┼──► auth-service
//!             │                         │                 │                          │    user-service
//!             │                    Redis counters    [Auth → Admin]                  │    property-service
//!             └─────────────────────────────────────────────────────────────────────┘    ...
//! ```
//!
//! - [`config`]: file, environment and defaults.
//! - [`registry`]: logical service name to backend address.
//! - [`routes`]: the static route catalogue.
//! - [`proxy`]: the reverse-proxy forwarder.
//! - [`server`]: the hyper accept loop and graceful shutdown.
//!
//! ```bash
//! $ baribhara-gateway --config /etc/baribhara/gateway.toml
//! $ GATEWAY_PORT=9000 GATEWAY_RATE_LIMIT_REQUESTS=500 baribhara-gateway
//! ```

#![doc(html_root_url = "https://docs.rs/baribhara-gateway/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod proxy;
pub mod registry;
pub mod routes;
pub mod server;
pub mod shutdown;

pub use config::{GatewayConfig, RateLimitBackend, ServiceSettings};
pub use error::{GatewayStartupError, StartupResult};
pub use health::{health_response, HealthResponse};
pub use proxy::{Forwarder, ForwarderConfig, ProxyTarget};
pub use registry::{ServiceEndpoint, ServiceRegistry};
pub use routes::catalogue;
pub use server::GatewayServer;
pub use shutdown::{ConnectionTracker, ShutdownSignal};

/// Gateway version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
