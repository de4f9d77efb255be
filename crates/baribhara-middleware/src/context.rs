//! Per-request pipeline context.
//!
//! The [`MiddlewareContext`] is created by the server for each request and
//! threaded through every stage by mutable reference. It is the only place
//! request-scoped state lives; nothing is stored in globals.

use baribhara_core::{RequestId, RequestIdentity};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Context that flows through the pipeline.
///
/// Stages enrich it as the request moves along: the logging stage settles
/// the request ID, the rate limiter records the client key, the dispatch
/// stage stores the route match, and the authentication stage stores the
/// caller identity for the admin guard.
///
/// # Example
///
/// ```
/// use baribhara_core::RequestIdentity;
/// use baribhara_middleware::context::MiddlewareContext;
///
/// let mut ctx = MiddlewareContext::new();
/// assert!(ctx.identity().is_none());
///
/// ctx.set_identity(RequestIdentity::new("u-1", "alice@example.com", "admin"));
/// assert!(ctx.identity().is_some_and(RequestIdentity::is_admin));
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// Caller identity, set only after a bearer token validated.
    identity: Option<RequestIdentity>,

    /// TCP peer address of the connection.
    peer_addr: Option<SocketAddr>,

    /// Client key used for rate limiting and logs.
    client: Option<String>,

    /// When the request entered the pipeline.
    started_at: Instant,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a context with a fresh request ID and no peer address.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            identity: None,
            peer_addr: None,
            client: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Creates a context for a request received from `peer_addr`.
    #[must_use]
    pub fn with_peer_addr(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr: Some(peer_addr),
            ..Self::new()
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Sets the request ID.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Returns the caller identity, if authenticated.
    #[must_use]
    pub fn identity(&self) -> Option<&RequestIdentity> {
        self.identity.as_ref()
    }

    /// Sets the caller identity.
    pub fn set_identity(&mut self, identity: RequestIdentity) {
        self.identity = Some(identity);
    }

    /// Returns the TCP peer address.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the client key, once the rate limiter resolved it.
    #[must_use]
    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    /// Sets the client key.
    pub fn set_client(&mut self, client: impl Into<String>) {
        self.client = Some(client.into());
    }

    /// Returns when the request entered the pipeline.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the time spent in the pipeline so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value, replacing any previous one.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}
