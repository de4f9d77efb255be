//! The route table and its builder.
//!
//! A [`RouteTable`] is built once from a list of [`Route`] declarations and is
//! read-only afterwards, so it can be shared across request tasks behind an
//! `Arc` without locking.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::Method;
use thiserror::Error;

use crate::node::{parse_pattern, Captures, Node, Segment};
use crate::params::Params;

/// Which guard stages a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protection {
    /// No authentication.
    Public,
    /// A valid bearer token is required.
    Authenticated,
    /// A valid bearer token with the admin role is required.
    AdminOnly,
}

impl Protection {
    /// All protection levels, least to most restrictive.
    pub const ALL: [Protection; 3] = [Self::Public, Self::Authenticated, Self::AdminOnly];

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Authenticated => "authenticated",
            Self::AdminOnly => "admin",
        }
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route declaration, before validation.
///
/// # Example
///
/// ```rust
/// use baribhara_router::{Protection, Route};
/// use http::Method;
///
/// let route = Route::new(Method::GET, "/api/v1/users/:id", Protection::Authenticated, "user-service");
/// assert_eq!(route.target, "/api/v1/users/:id");
///
/// let rewritten = Route::new(Method::GET, "/me", Protection::Authenticated, "auth-service")
///     .with_target("/api/v1/auth/profile");
/// assert_eq!(rewritten.target, "/api/v1/auth/profile");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// HTTP method.
    pub method: Method,
    /// Inbound path pattern with `:name` parameters.
    pub pattern: String,
    /// Guard stages required.
    pub protection: Protection,
    /// Logical backend service name.
    pub service: String,
    /// Target path template; defaults to the pattern.
    pub target: String,
}

impl Route {
    /// Declares a route whose target path equals its inbound pattern.
    pub fn new(
        method: Method,
        pattern: impl Into<String>,
        protection: Protection,
        service: impl Into<String>,
    ) -> Self {
        let pattern = pattern.into();
        Self {
            method,
            target: pattern.clone(),
            pattern,
            protection,
            service: service.into(),
        }
    }

    /// Overrides the target path template.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// A validated, registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    method: Method,
    pattern: String,
    protection: Protection,
    service: String,
    target: String,
    param_names: Vec<String>,
    static_segments: usize,
    order: usize,
}

impl RouteEntry {
    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Inbound path pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Guard stages required.
    #[must_use]
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Logical backend service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Target path template.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Parameter names in pattern order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Number of literal segments in the pattern.
    #[must_use]
    pub fn static_segments(&self) -> usize {
        self.static_segments
    }

    /// Registration index; lower registered earlier.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }
}

/// A matched route with its extracted parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// The matched entry.
    pub entry: Arc<RouteEntry>,
    /// Parameters extracted from the request path.
    pub params: Params,
}

impl RouteMatch {
    /// Renders the target path template with this match's parameters.
    #[must_use]
    pub fn target_path(&self) -> String {
        self.params.render(&self.entry.target)
    }
}

/// No route matched the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no route matches {method} {path}")]
pub struct NoRoute {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
}

/// A route declaration was rejected while building the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The pattern is malformed.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The target template references a parameter the pattern lacks.
    #[error("target '{target}' of route '{pattern}' uses unknown parameter ':{param}'")]
    UnknownTargetParam {
        /// Route pattern.
        pattern: String,
        /// Target template.
        target: String,
        /// Unknown parameter name.
        param: String,
    },

    /// The route names no service.
    #[error("route '{pattern}' has an empty service name")]
    MissingService {
        /// Route pattern.
        pattern: String,
    },
}

/// Builder for [`RouteTable`].
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: Vec<Route>,
}

impl RouteTableBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route declaration. Registration order is preserved.
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Adds a public route whose target equals its pattern.
    #[must_use]
    pub fn public(self, method: Method, pattern: &str, service: &str) -> Self {
        self.route(Route::new(method, pattern, Protection::Public, service))
    }

    /// Adds a route that requires a valid bearer token.
    #[must_use]
    pub fn authenticated(self, method: Method, pattern: &str, service: &str) -> Self {
        self.route(Route::new(method, pattern, Protection::Authenticated, service))
    }

    /// Adds a route that requires the admin role.
    #[must_use]
    pub fn admin(self, method: Method, pattern: &str, service: &str) -> Self {
        self.route(Route::new(method, pattern, Protection::AdminOnly, service))
    }

    /// Adds many route declarations.
    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Validates every declaration and builds the table.
    ///
    /// A second declaration with the same method and path shape as an
    /// earlier one is dropped; the first registration wins.
    pub fn build(self) -> Result<RouteTable, RouteError> {
        let mut root = Node::root();
        let mut entries: Vec<Arc<RouteEntry>> = Vec::with_capacity(self.routes.len());
        let mut shadowed = 0;

        for (order, route) in self.routes.into_iter().enumerate() {
            let segments = parse_pattern(&route.pattern);
            let entry = validate(&route, &segments, order)?;

            if root.insert(&segments, &route.method, entries.len()) {
                entries.push(Arc::new(entry));
            } else {
                shadowed += 1;
            }
        }

        Ok(RouteTable {
            root,
            entries,
            shadowed,
        })
    }
}

fn validate(route: &Route, segments: &[Segment<'_>], order: usize) -> Result<RouteEntry, RouteError> {
    let invalid = |reason| RouteError::InvalidPattern {
        pattern: route.pattern.clone(),
        reason,
    };

    if !route.pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if route.service.is_empty() {
        return Err(RouteError::MissingService {
            pattern: route.pattern.clone(),
        });
    }

    let mut param_names = Vec::new();
    let mut seen = HashSet::new();
    for segment in segments {
        if let Segment::Param(name) = segment {
            if name.is_empty() {
                return Err(invalid("parameter name must not be empty"));
            }
            if !seen.insert(*name) {
                return Err(invalid("parameter names must be unique"));
            }
            param_names.push((*name).to_string());
        }
    }

    if !route.target.starts_with('/') {
        return Err(invalid("target must start with '/'"));
    }
    for segment in parse_pattern(&route.target) {
        if let Segment::Param(name) = segment {
            if !seen.contains(name) {
                return Err(RouteError::UnknownTargetParam {
                    pattern: route.pattern.clone(),
                    target: route.target.clone(),
                    param: name.to_string(),
                });
            }
        }
    }

    Ok(RouteEntry {
        method: route.method.clone(),
        pattern: route.pattern.clone(),
        protection: route.protection,
        service: route.service.clone(),
        target: route.target.clone(),
        param_names,
        static_segments: segments.iter().filter(|s| s.is_static()).count(),
        order,
    })
}

/// The immutable route dispatch table.
///
/// # Route Priority
///
/// When several patterns match a request, the one with the most static
/// segments wins; among equally specific patterns the earliest registration
/// wins. So `/properties/search` beats `/properties/:id` for the path
/// `/properties/search` no matter which was registered first.
///
/// # Example
///
/// ```rust
/// use baribhara_router::{Protection, Route, RouteTable};
/// use http::Method;
///
/// let table = RouteTable::builder()
///     .route(Route::new(Method::GET, "/api/v1/users/:id", Protection::Authenticated, "user-service"))
///     .build()
///     .unwrap();
///
/// let matched = table.dispatch(&Method::GET, "/api/v1/users/42").unwrap();
/// assert_eq!(matched.entry.service(), "user-service");
/// assert_eq!(matched.target_path(), "/api/v1/users/42");
/// assert!(table.dispatch(&Method::GET, "/api/v1/nothing").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RouteTable {
    root: Node,
    entries: Vec<Arc<RouteEntry>>,
    shadowed: usize,
}

impl RouteTable {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    /// Matches a request against the table.
    pub fn dispatch(&self, method: &Method, path: &str) -> Result<RouteMatch, NoRoute> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut candidates = Vec::new();
        self.root
            .collect(&segments, method, &mut Captures::new(), &mut candidates);

        let best = candidates.into_iter().max_by(|(a, _), (b, _)| {
            let (a, b) = (&self.entries[*a], &self.entries[*b]);
            a.static_segments
                .cmp(&b.static_segments)
                .then_with(|| b.order.cmp(&a.order))
        });

        match best {
            Some((index, captures)) => {
                let entry = Arc::clone(&self.entries[index]);
                let params = entry
                    .param_names
                    .iter()
                    .cloned()
                    .zip(captures.iter().map(|value| (*value).to_string()))
                    .collect();
                Ok(RouteMatch { entry, params })
            }
            None => Err(NoRoute {
                method: method.clone(),
                path: path.to_string(),
            }),
        }
    }

    /// Registered entries in registration order.
    #[must_use]
    pub fn entries(&self) -> &[Arc<RouteEntry>] {
        &self.entries
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of declarations dropped because an earlier one shadowed them.
    #[must_use]
    pub fn shadowed(&self) -> usize {
        self.shadowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(routes: Vec<Route>) -> RouteTable {
        RouteTable::builder().routes(routes).build().unwrap()
    }

    fn get(pattern: &str, service: &str) -> Route {
        Route::new(Method::GET, pattern, Protection::Authenticated, service)
    }

    #[test]
    fn test_static_beats_param_regardless_of_order() {
        for routes in [
            vec![get("/properties/:id", "by-id"), get("/properties/search", "search")],
            vec![get("/properties/search", "search"), get("/properties/:id", "by-id")],
        ] {
            let t = table(routes);
            let m = t.dispatch(&Method::GET, "/properties/search").unwrap();
            assert_eq!(m.entry.service(), "search");
            assert!(m.params.is_empty());

            let m = t.dispatch(&Method::GET, "/properties/17").unwrap();
            assert_eq!(m.entry.service(), "by-id");
            assert_eq!(m.params.get("id"), Some("17"));
        }
    }

    #[test]
    fn test_static_count_ranks_across_branches() {
        // The param-first pattern has more literal segments overall.
        let t = table(vec![
            get("/a/:x/:y", "one-static"),
            get("/:x/b/c", "two-static"),
        ]);
        let m = t.dispatch(&Method::GET, "/a/b/c").unwrap();
        assert_eq!(m.entry.service(), "two-static");
    }

    #[test]
    fn test_equal_specificity_uses_registration_order() {
        let first = table(vec![get("/a/:x/c", "first"), get("/:y/b/c", "second")]);
        assert_eq!(first.dispatch(&Method::GET, "/a/b/c").unwrap().entry.service(), "first");

        let second = table(vec![get("/:y/b/c", "second"), get("/a/:x/c", "first")]);
        assert_eq!(second.dispatch(&Method::GET, "/a/b/c").unwrap().entry.service(), "second");
    }

    #[test]
    fn test_duplicate_shape_keeps_first() {
        let t = table(vec![get("/users/:id", "first"), get("/users/:uid", "second")]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.shadowed(), 1);
        let m = t.dispatch(&Method::GET, "/users/9").unwrap();
        assert_eq!(m.entry.service(), "first");
        assert_eq!(m.params.get("id"), Some("9"));
    }

    #[test]
    fn test_method_must_match() {
        let t = table(vec![get("/users", "user-service")]);
        let err = t.dispatch(&Method::DELETE, "/users").unwrap_err();
        assert_eq!(err.method, Method::DELETE);
        assert_eq!(err.path, "/users");
        assert!(t.dispatch(&Method::GET, "/users").is_ok());
    }

    #[test]
    fn test_param_requires_a_segment() {
        let t = table(vec![get("/users/:id", "user-service")]);
        assert!(t.dispatch(&Method::GET, "/users").is_err());
        assert!(t.dispatch(&Method::GET, "/users/1/extra").is_err());
    }

    #[test]
    fn test_target_rewrite() {
        let t = table(vec![Route::new(
            Method::POST,
            "/pay/:invoice",
            Protection::Authenticated,
            "invoice-service",
        )
        .with_target("/api/v1/invoices/:invoice/pay")]);
        let m = t.dispatch(&Method::POST, "/pay/inv-3").unwrap();
        assert_eq!(m.target_path(), "/api/v1/invoices/inv-3/pay");
    }

    #[test]
    fn test_entry_metadata() {
        let t = table(vec![Route::new(
            Method::PUT,
            "/api/v1/admin/users/:id/status",
            Protection::AdminOnly,
            "admin-service",
        )]);
        let entry = &t.entries()[0];
        assert_eq!(entry.protection(), Protection::AdminOnly);
        assert_eq!(entry.static_segments(), 5);
        assert_eq!(entry.param_names(), ["id".to_string()]);
        assert_eq!(entry.order(), 0);
    }

    #[test]
    fn test_invalid_declarations() {
        let no_slash = RouteTable::builder().route(get("users", "svc")).build();
        assert!(matches!(no_slash, Err(RouteError::InvalidPattern { .. })));

        let empty_param = RouteTable::builder().route(get("/users/:", "svc")).build();
        assert!(matches!(empty_param, Err(RouteError::InvalidPattern { .. })));

        let repeated = RouteTable::builder().route(get("/a/:id/b/:id", "svc")).build();
        assert!(matches!(repeated, Err(RouteError::InvalidPattern { .. })));

        let unknown = RouteTable::builder()
            .route(get("/users/:id", "svc").with_target("/users/:uid"))
            .build();
        assert!(matches!(unknown, Err(RouteError::UnknownTargetParam { .. })));

        let no_service = RouteTable::builder().route(get("/users", "")).build();
        assert!(matches!(no_service, Err(RouteError::MissingService { .. })));
    }

    #[test]
    fn test_builder_shorthands() {
        let t = RouteTable::builder()
            .public(Method::POST, "/auth/login", "auth-service")
            .authenticated(Method::GET, "/users", "user-service")
            .admin(Method::GET, "/admin/stats", "admin-service")
            .build()
            .unwrap();
        let levels: Vec<Protection> = t.entries().iter().map(|e| e.protection()).collect();
        assert_eq!(levels, Protection::ALL.to_vec());
    }

    #[test]
    fn test_protection_labels() {
        assert_eq!(Protection::AdminOnly.to_string(), "admin");
        assert_eq!(Protection::ALL.len(), 3);
    }
}
