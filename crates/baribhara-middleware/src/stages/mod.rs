//! Gateway pipeline stages.
//!
//! Stages run outermost first:
//!
//! 1. [`recovery`] - turn panics into `500`
//! 2. [`request_logging`] - request id, access log, request metrics
//! 3. [`cors`] - preflight answers and CORS headers
//! 4. [`rate_limit`] - fixed-window limit per client
//! 5. [`dispatch`] - route match, then per-route guards:
//!    [`authentication`] and [`authorization`]
//!
//! The forwarder is the terminal handler and lives in the gateway crate.

pub mod authentication;
pub mod authorization;
pub mod cors;
pub mod dispatch;
pub mod rate_limit;
pub mod recovery;
pub mod request_logging;

pub use authentication::{AuthError, AuthenticationMiddleware, JwtValidator};
pub use authorization::AdminGuardMiddleware;
pub use cors::{AllowedOrigins, CorsBuilder, CorsMiddleware};
pub use dispatch::DispatchMiddleware;
pub use rate_limit::{
    ClientResolver, RateLimitDecision, RateLimitMiddleware, RateLimitPolicy, RateLimiter,
};
pub use recovery::RecoveryMiddleware;
pub use request_logging::{RequestLoggingMiddleware, REQUEST_ID_HEADER};
