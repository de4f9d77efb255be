//! Static route dispatch table for the Baribhara gateway.
//!
//! Routes are declared once at startup as `(method, pattern, protection,
//! service, target)` and compiled into a radix tree. Lookups walk the tree
//! segment by segment and rank every matching pattern by specificity, so a
//! literal segment always beats a `:param` segment at the same position.
//!
//! # Example
//!
//! ```rust
//! use baribhara_router::{Protection, Route, RouteTable};
//! use http::Method;
//!
//! let table = RouteTable::builder()
//!     .route(Route::new(Method::GET, "/api/v1/properties/:id", Protection::Authenticated, "property-service"))
//!     .route(Route::new(Method::GET, "/api/v1/properties/search", Protection::Authenticated, "search-service"))
//!     .build()
//!     .unwrap();
//!
//! let matched = table.dispatch(&Method::GET, "/api/v1/properties/search").unwrap();
//! assert_eq!(matched.entry.service(), "search-service");
//!
//! let matched = table.dispatch(&Method::GET, "/api/v1/properties/p-1").unwrap();
//! assert_eq!(matched.params.get("id"), Some("p-1"));
//! ```
//!
//! # Layout
//!
//! ```text
//!                 (root)
//!                   │
//!                 "api"
//!                   │
//!                 "v1"
//!                   │
//!             "properties"
//!              ┌────┴────┐
//!          "search"     :param
//!           [GET]       [GET]
//! ```

mod method_table;
mod node;
mod params;
mod table;

pub use params::Params;
pub use table::{
    NoRoute, Protection, Route, RouteEntry, RouteError, RouteMatch, RouteTable, RouteTableBuilder,
};
