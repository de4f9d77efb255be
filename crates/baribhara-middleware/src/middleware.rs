//! Core middleware trait and chain types.
//!
//! Every stage implements [`Middleware`]. A stage either calls
//! [`Next::run`] to hand the request to the rest of the chain, or returns a
//! response of its own, which short-circuits everything downstream.
//!
//! # Example
//!
//! ```
//! use baribhara_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, Request, Response};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let response = next.run(ctx, request).await;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "timed");
//!             response
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The terminal handler at the end of a chain.
pub type Handler<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a>;

/// A pipeline stage.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once.
/// - A stage that does not call `next` must return a complete response.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the stage name, used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request, usually by delegating to `next`.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The remainder of the chain after the current stage.
///
/// `run` consumes `self`, so the rest of the chain can run only once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Handler<'a>),
}

impl<'a> Next<'a> {
    /// Links `middleware` in front of `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Links a list of stages in front of `self`, first stage outermost.
    pub(crate) fn prepend<M>(self, stages: &'a [M]) -> Self
    where
        M: AsRef<dyn Middleware>,
    {
        stages
            .iter()
            .rev()
            .fold(self, |next, stage| Next::new(stage.as_ref(), next))
    }

    /// Invokes the next stage or the terminal handler.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}
