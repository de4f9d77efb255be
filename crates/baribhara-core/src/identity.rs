//! Caller identity extracted from a validated bearer token.

use serde::{Deserialize, Serialize};

/// Role value that grants access to admin-only routes.
pub const ADMIN_ROLE: &str = "admin";

/// The identity of the caller for the lifetime of one request.
///
/// Built by the authentication stage from the token's `sub`, `email` and
/// `role` claims and read by the admin guard. Never persisted.
///
/// # Example
///
/// ```
/// use baribhara_core::RequestIdentity;
///
/// let identity = RequestIdentity::new("u-42", "alice@example.com", "admin");
/// assert!(identity.is_admin());
/// assert_eq!(identity.log_id(), "user:u-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// Subject (user id).
    pub subject: String,
    /// Email address, empty when the token carries none.
    pub email: String,
    /// Role name, empty when the token carries none.
    pub role: String,
}

impl RequestIdentity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
            role: role.into(),
        }
    }

    /// Returns true if the role is exactly [`ADMIN_ROLE`].
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    /// Returns an identifier suitable for logs. Never includes the token.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("user:{}", self.subject)
    }
}
