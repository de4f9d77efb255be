//! Panic recovery stage.
//!
//! Outermost stage of the pipeline. A panic anywhere downstream is caught,
//! logged, and turned into a 500 so the connection task survives and the
//! caller still gets a well-formed JSON body.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use baribhara_core::GatewayError;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Converts downstream panics into `500 Internal server error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            match AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await {
                Ok(response) => response,
                Err(payload) => {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        method = %method,
                        path = %path,
                        panic = panic_message(payload.as_ref()),
                        "request handler panicked"
                    );
                    Response::from_error(&GatewayError::internal("panic"))
                }
            }
        })
    }
}
