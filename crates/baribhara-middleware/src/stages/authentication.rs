//! Bearer token authentication.
//!
//! The stage runs only for routes that require authentication. It expects
//! an `Authorization: Bearer <token>` header carrying an HMAC-signed JWT,
//! and on success stores the caller's [`RequestIdentity`] in the context.
//!
//! ## Failure Responses
//!
//! | Condition | Body |
//! |---|---|
//! | no `Authorization` header | `{"error":"Authorization header required"}` |
//! | not `Bearer <token>` | `{"error":"Bearer token required"}` |
//! | bad signature, expired, unparsable | `{"error":"Invalid token"}` |
//!
//! All three are `401 Unauthorized`.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use baribhara_core::{GatewayError, RequestIdentity};
use http::{header, HeaderValue};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

const BEARER_PREFIX: &str = "Bearer ";

/// Why a request failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization` header, or an empty one.
    #[error("authorization header missing")]
    MissingCredentials,

    /// The header is not `Bearer <token>`.
    #[error("authorization header is not a bearer credential")]
    MalformedCredentials,

    /// The token failed verification.
    #[error("invalid token: {0}")]
    InvalidCredentials(String),
}

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MissingCredentials => Self::MissingCredentials,
            AuthError::MalformedCredentials => Self::MalformedCredentials,
            AuthError::InvalidCredentials(reason) => Self::invalid_credentials(reason),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    role: String,
}

/// Verifies HMAC-signed bearer tokens.
///
/// HS256, HS384 and HS512 are accepted. `exp` and `sub` are required and
/// expiry is checked with no leeway.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Creates a validator for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validates an `Authorization` header value.
    pub fn validate(&self, header: Option<&HeaderValue>) -> Result<RequestIdentity, AuthError> {
        let value = match header {
            Some(value) if !value.is_empty() => value,
            _ => return Err(AuthError::MissingCredentials),
        };

        let token = value
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MalformedCredentials)?;

        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidCredentials(e.to_string()))?;

        Ok(RequestIdentity::new(
            data.claims.sub,
            data.claims.email,
            data.claims.role,
        ))
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

/// Rejects requests without a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticationMiddleware {
    validator: JwtValidator,
}

impl AuthenticationMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(validator: JwtValidator) -> Self {
        Self { validator }
    }
}

impl Middleware for AuthenticationMiddleware {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match self.validator.validate(request.headers().get(header::AUTHORIZATION)) {
                Ok(identity) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        caller = %identity.log_id(),
                        "request authenticated"
                    );
                    ctx.set_identity(identity);
                    next.run(ctx, request).await
                }
                Err(error) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        path = %request.uri().path(),
                        error = %error,
                        "authentication failed"
                    );
                    Response::from_error(&GatewayError::from(error))
                }
            }
        })
    }
}
