//! # Baribhara Core
//!
//! Core types shared by every crate of the Baribhara API gateway.
//!
//! ## Overview
//!
//! - [`GatewayError`] / [`ErrorKind`] - the closed set of per-request failures
//!   and the HTTP status each one maps to
//! - [`ErrorBody`] - the `{"error": ...}` JSON body returned to callers
//! - [`RequestIdentity`] - the caller identity extracted from a bearer token
//! - [`RequestId`] - UUID v7 request identifier used for log correlation
//!
//! ## Example
//!
//! ```
//! use baribhara_core::{ErrorKind, GatewayError};
//! use http::StatusCode;
//!
//! let error = GatewayError::MissingCredentials;
//! assert_eq!(error.kind(), ErrorKind::MissingCredentials);
//! assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
//! assert_eq!(error.to_body().error, "Authorization header required");
//! ```

#![doc(html_root_url = "https://docs.rs/baribhara-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod identity;
mod request_id;

pub use error::{ErrorBody, ErrorKind, GatewayError, GatewayResult};
pub use identity::{RequestIdentity, ADMIN_ROLE};
pub use request_id::RequestId;
