//! # Baribhara Middleware
//!
//! The request pipeline of the Baribhara API gateway.
//!
//! Every request that is not a health or metrics probe passes through the
//! same ordered chain of stages before it reaches the forwarder:
//!
//! ```text
//! Request → Recovery → Logging → CORS → RateLimit → Dispatch ─┬─ public ───────────────┐
//!                                                             ├─ Authentication ───────┤
//!                                                             └─ Authentication → Admin┤
//!                                                                                      ↓
//! Response ←──────────────────────────────────────────────────────────────────── Forwarder
//! ```
//!
//! | Stage | Middleware | Short-circuits with |
//! |-------|------------|---------------------|
//! | 1 | Recovery | `500` on panic |
//! | 2 | Request logging | never |
//! | 3 | CORS | `204`/`403` on preflight |
//! | 4 | Rate limit | `429` |
//! | 5 | Dispatch | `404` |
//! | 5a | Authentication | `401` |
//! | 5b | Admin guard | `403` |
//!
//! ## Example
//!
//! ```
//! use baribhara_middleware::stages::{RecoveryMiddleware, RequestLoggingMiddleware};
//! use baribhara_middleware::Pipeline;
//!
//! let pipeline = Pipeline::builder()
//!     .stage(RecoveryMiddleware::new())
//!     .stage(RequestLoggingMiddleware::new())
//!     .build();
//! assert_eq!(pipeline.stage_names(), vec!["recovery", "request_logging"]);
//! ```

#![doc(html_root_url = "https://docs.rs/baribhara-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod store;
pub mod types;

pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder};
pub use store::{CounterStore, MemoryCounterStore, RedisCounterStore, RedisSettings, StoreError};
pub use types::{Request, Response, ResponseExt};
