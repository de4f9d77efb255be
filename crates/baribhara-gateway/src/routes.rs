//! The gateway's route catalogue.
//!
//! Every route lives under `/api/v1` and forwards to the same path on its
//! service.

use baribhara_router::{Protection, Route, RouteError, RouteTable};
use http::Method;

/// Common prefix of every route.
pub const API_PREFIX: &str = "/api/v1";

/// CRUD-shaped resources: list, search, get, create, update, delete.
const RESOURCE_SERVICES: [(&str, &str); 3] = [
    ("properties", "property-service"),
    ("tenants", "tenant-service"),
    ("caretakers", "caretaker-service"),
];

fn route(method: Method, path: &str, protection: Protection, service: &str) -> Route {
    Route::new(method, format!("{API_PREFIX}{path}"), protection, service)
}

fn public(method: Method, path: &str, service: &str) -> Route {
    route(method, path, Protection::Public, service)
}

fn authenticated(method: Method, path: &str, service: &str) -> Route {
    route(method, path, Protection::Authenticated, service)
}

fn admin(method: Method, path: &str) -> Route {
    route(method, path, Protection::AdminOnly, "admin-service")
}

/// Returns every route declaration in registration order.
pub fn declarations() -> Vec<Route> {
    let mut routes = vec![
        public(Method::POST, "/auth/register", "auth-service"),
        public(Method::POST, "/auth/login", "auth-service"),
        public(Method::POST, "/auth/refresh", "auth-service"),
        authenticated(Method::GET, "/auth/profile", "auth-service"),
        authenticated(Method::PUT, "/auth/profile", "auth-service"),
        authenticated(Method::POST, "/auth/logout", "auth-service"),
        authenticated(Method::GET, "/users", "user-service"),
        authenticated(Method::GET, "/users/:id", "user-service"),
        authenticated(Method::PUT, "/users/:id", "user-service"),
        authenticated(Method::DELETE, "/users/:id", "user-service"),
    ];

    for (resource, service) in RESOURCE_SERVICES {
        let collection = format!("/{resource}");
        let search = format!("/{resource}/search");
        let item = format!("/{resource}/:id");
        routes.extend([
            authenticated(Method::GET, &collection, service),
            authenticated(Method::GET, &search, service),
            authenticated(Method::GET, &item, service),
            authenticated(Method::POST, &collection, service),
            authenticated(Method::PUT, &item, service),
            authenticated(Method::DELETE, &item, service),
        ]);
    }

    routes.extend([
        authenticated(Method::GET, "/invoices", "invoice-service"),
        authenticated(Method::GET, "/invoices/:id", "invoice-service"),
        authenticated(Method::POST, "/invoices", "invoice-service"),
        authenticated(Method::PUT, "/invoices/:id", "invoice-service"),
        authenticated(Method::POST, "/invoices/:id/pay", "invoice-service"),
        authenticated(Method::GET, "/notifications", "notification-service"),
        authenticated(Method::POST, "/notifications", "notification-service"),
        authenticated(Method::PUT, "/notifications/:id/read", "notification-service"),
        authenticated(Method::GET, "/reports/properties", "report-service"),
        authenticated(Method::GET, "/reports/tenants", "report-service"),
        authenticated(Method::GET, "/reports/invoices", "report-service"),
        authenticated(Method::POST, "/reports/generate", "report-service"),
        admin(Method::GET, "/admin/stats"),
        admin(Method::GET, "/admin/users"),
        admin(Method::PUT, "/admin/users/:id/status"),
    ]);

    routes
}

/// Builds the route table.
pub fn catalogue() -> Result<RouteTable, RouteError> {
    RouteTable::builder().routes(declarations()).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        catalogue().unwrap()
    }

    #[test]
    fn test_catalogue_size() {
        let table = table();
        assert_eq!(table.len(), 43);
        assert_eq!(table.shadowed(), 0);
    }

    #[test]
    fn test_public_routes() {
        let table = table();
        for path in ["/api/v1/auth/register", "/api/v1/auth/login", "/api/v1/auth/refresh"] {
            let matched = table.dispatch(&Method::POST, path).unwrap();
            assert_eq!(matched.entry.protection(), Protection::Public);
            assert_eq!(matched.entry.service(), "auth-service");
        }
    }

    #[test]
    fn test_search_outranks_item() {
        let matched = table()
            .dispatch(&Method::GET, "/api/v1/tenants/search")
            .unwrap();
        assert_eq!(matched.entry.pattern(), "/api/v1/tenants/search");
        assert!(matched.params.is_empty());

        let matched = table()
            .dispatch(&Method::GET, "/api/v1/caretakers/c-9")
            .unwrap();
        assert_eq!(matched.entry.service(), "caretaker-service");
        assert_eq!(matched.params.get("id"), Some("c-9"));
    }

    #[test]
    fn test_target_equals_inbound_path() {
        let matched = table()
            .dispatch(&Method::POST, "/api/v1/invoices/inv-3/pay")
            .unwrap();
        assert_eq!(matched.target_path(), "/api/v1/invoices/inv-3/pay");
        assert_eq!(matched.entry.service(), "invoice-service");
    }

    #[test]
    fn test_admin_routes() {
        let matched = table()
            .dispatch(&Method::PUT, "/api/v1/admin/users/u-1/status")
            .unwrap();
        assert_eq!(matched.entry.protection(), Protection::AdminOnly);
        assert_eq!(matched.entry.service(), "admin-service");
    }

    #[test]
    fn test_method_mismatch_is_no_route() {
        assert!(table().dispatch(&Method::DELETE, "/api/v1/invoices/1").is_err());
        assert!(table().dispatch(&Method::GET, "/api/v1/unknown").is_err());
    }

    #[test]
    fn test_every_route_targets_a_default_service() {
        let services = crate::config::default_services();
        for entry in table().entries() {
            assert!(services.contains_key(entry.service()), "{}", entry.service());
        }
    }
}
