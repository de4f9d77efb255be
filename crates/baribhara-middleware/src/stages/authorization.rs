//! Admin-only authorization.
//!
//! Runs after authentication on admin routes. The guard is fail-closed: a
//! missing identity is treated exactly like a non-admin caller.

use crate::{
    context::MiddlewareContext,
    middleware::{BoxFuture, Middleware, Next},
    types::{Request, Response, ResponseExt},
};
use baribhara_core::{GatewayError, RequestIdentity};

/// Admits only callers whose role is `admin`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminGuardMiddleware;

impl AdminGuardMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decides whether `identity` may proceed.
    ///
    /// # Example
    ///
    /// ```
    /// use baribhara_core::RequestIdentity;
    /// use baribhara_middleware::stages::AdminGuardMiddleware;
    ///
    /// let admin = RequestIdentity::new("u-1", "", "admin");
    /// assert!(AdminGuardMiddleware::check(Some(&admin)).is_ok());
    /// assert!(AdminGuardMiddleware::check(None).is_err());
    /// ```
    pub fn check(identity: Option<&RequestIdentity>) -> Result<(), GatewayError> {
        match identity {
            Some(identity) if identity.is_admin() => Ok(()),
            _ => Err(GatewayError::Forbidden),
        }
    }
}

impl Middleware for AdminGuardMiddleware {
    fn name(&self) -> &'static str {
        "admin_guard"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if let Err(error) = Self::check(ctx.identity()) {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    caller = ctx.identity().map(RequestIdentity::log_id).as_deref().unwrap_or("anonymous"),
                    path = %request.uri().path(),
                    "admin access denied"
                );
                return Response::from_error(&error);
            }
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full};

    async fn run(identity: Option<RequestIdentity>) -> Response {
        let mut ctx = MiddlewareContext::new();
        if let Some(identity) = identity {
            ctx.set_identity(identity);
        }
        let next = Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::OK) }));
        AdminGuardMiddleware::new()
            .process(&mut ctx, http::Request::new(Full::new(Bytes::new())), next)
            .await
    }

    #[tokio::test]
    async fn test_admin_passes() {
        let response = run(Some(RequestIdentity::new("u-1", "a@example.com", "admin"))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_admin_forbidden() {
        for role in ["user", "Admin", ""] {
            let response = run(Some(RequestIdentity::new("u-1", "", role))).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "role {role:?}");
        }
    }

    #[tokio::test]
    async fn test_missing_identity_forbidden() {
        let response = run(None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Admin access required" }));
    }
}
