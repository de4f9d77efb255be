//! Ordered middleware pipeline.
//!
//! The gateway assembles its pipeline once at startup:
//!
//! ```text
//! Recovery → RequestLogging → Cors → RateLimit → Dispatch → forwarder
//!                                                    │
//!                                  [Authentication → AdminGuard]
//!                                  (linked per matched route)
//! ```
//!
//! Stages run in the order they were added. The order cannot change after
//! [`PipelineBuilder::build`].

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased stage that can be stored in a list.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An immutable, ordered list of stages.
///
/// # Example
///
/// ```
/// use baribhara_middleware::{MiddlewareContext, Pipeline, Response, ResponseExt};
/// use baribhara_middleware::stages::RecoveryMiddleware;
/// use bytes::Bytes;
/// use http::StatusCode;
/// use http_body_util::Full;
///
/// let pipeline = Pipeline::builder().stage(RecoveryMiddleware::new()).build();
/// assert_eq!(pipeline.stage_names(), vec!["recovery"]);
///
/// # tokio_test::block_on(async {
/// let request = http::Request::new(Full::new(Bytes::new()));
/// let response = pipeline
///     .process(MiddlewareContext::new(), request, |_ctx, _req| {
///         Box::pin(async { Response::empty(StatusCode::OK) })
///     })
///     .await;
/// assert_eq!(response.status(), StatusCode::OK);
/// # });
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs a request through every stage and then `handler`.
    pub async fn process<H>(
        &self,
        mut ctx: MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(&mut ctx, request).await
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Next::handler(handler).prepend(&self.stages)
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends a stage that is already shared.
    #[must_use]
    pub fn shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use parking_lot::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.log.lock().push(format!("enter {}", self.name));
                let response = next.run(ctx, request).await;
                self.log.lock().push(format!("leave {}", self.name));
                response
            })
        }
    }

    struct Reject;

    impl Middleware for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { Response::empty(StatusCode::FORBIDDEN) })
        }
    }

    fn request() -> Request {
        http::Request::new(Full::new(Bytes::new()))
    }

    #[tokio::test]
    async fn test_stages_wrap_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(Record { name: "outer", log: log.clone() })
            .stage(Record { name: "inner", log: log.clone() })
            .build();

        let handler_log = log.clone();
        let response = pipeline
            .process(MiddlewareContext::new(), request(), move |_ctx, _req| {
                handler_log.lock().push("handler".to_string());
                Box::pin(async { Response::empty(StatusCode::OK) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *log.lock(),
            vec!["enter outer", "enter inner", "handler", "leave inner", "leave outer"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(Reject)
            .stage(Record { name: "unreached", log: log.clone() })
            .build();

        let response = pipeline
            .process(MiddlewareContext::new(), request(), |_ctx, _req| {
                Box::pin(async { Response::empty(StatusCode::OK) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_stage_names() {
        let pipeline = Pipeline::builder().stage(Reject).build();
        assert_eq!(pipeline.stage_names(), vec!["reject"]);
        assert_eq!(pipeline.stage_count(), 1);
        assert_eq!(Pipeline::builder().build().stage_count(), 0);
    }
}
