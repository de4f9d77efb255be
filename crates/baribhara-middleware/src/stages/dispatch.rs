//! Route dispatch stage.
//!
//! Matches the request against the [`RouteTable`], stores the
//! [`RouteMatch`] in the context for the forwarder, and links the guard
//! stages the route's [`Protection`] calls for in front of the rest of the
//! chain:
//!
//! | Protection | Guards |
//! |---|---|
//! | `Public` | none |
//! | `Authenticated` | authentication |
//! | `AdminOnly` | authentication, admin guard |
//!
//! Unmatched requests get `404 {"error":"Not found"}`.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::BoxedMiddleware;
use crate::stages::{AdminGuardMiddleware, AuthenticationMiddleware};
use crate::types::{Request, Response, ResponseExt};
use baribhara_core::GatewayError;
use baribhara_router::{Protection, RouteTable};
use std::sync::Arc;

/// Resolves routes and applies per-route guards.
pub struct DispatchMiddleware {
    table: Arc<RouteTable>,
    authenticated: Vec<BoxedMiddleware>,
    admin: Vec<BoxedMiddleware>,
}

impl DispatchMiddleware {
    /// Creates the stage with the standard guards.
    #[must_use]
    pub fn new(table: Arc<RouteTable>, authentication: AuthenticationMiddleware) -> Self {
        let authentication: BoxedMiddleware = Arc::new(authentication);
        Self {
            table,
            authenticated: vec![authentication.clone()],
            admin: vec![authentication, Arc::new(AdminGuardMiddleware::new())],
        }
    }

    /// Returns the route table.
    #[must_use]
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    fn guards(&self, protection: Protection) -> &[BoxedMiddleware] {
        match protection {
            Protection::Public => &[],
            Protection::Authenticated => &self.authenticated,
            Protection::AdminOnly => &self.admin,
        }
    }
}

impl std::fmt::Debug for DispatchMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchMiddleware")
            .field("routes", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl Middleware for DispatchMiddleware {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let matched = match self.table.dispatch(request.method(), request.uri().path()) {
                Ok(matched) => matched,
                Err(no_route) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        method = %no_route.method,
                        path = %no_route.path,
                        "no route"
                    );
                    return Response::from_error(&GatewayError::no_route(
                        no_route.method.as_str(),
                        no_route.path,
                    ));
                }
            };

            let protection = matched.entry.protection();
            tracing::trace!(
                request_id = %ctx.request_id(),
                pattern = matched.entry.pattern(),
                service = matched.entry.service(),
                protection = %protection,
                "route matched"
            );
            ctx.set_extension(matched);

            next.prepend(self.guards(protection)).run(ctx, request).await
        })
    }
}
