//! Path parameters extracted from a route match.

use smallvec::SmallVec;

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// Named path parameters, in pattern order.
///
/// Values are the raw path segments exactly as they appeared in the request,
/// still percent-encoded, so substituting them into a target template
/// forwards the caller's bytes unchanged.
///
/// # Example
///
/// ```rust
/// use baribhara_router::Params;
///
/// let params: Params = [("id".to_string(), "42".to_string())].into_iter().collect();
/// assert_eq!(params.get("id"), Some("42"));
/// assert_eq!(params.render("/api/v1/users/:id"), "/api/v1/users/42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Substitutes `:name` segments of `template` with parameter values.
    ///
    /// Segments naming an unknown parameter are left as written; the route
    /// table rejects such templates at build time.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        let mut rendered = String::with_capacity(template.len() + 16);
        for (i, segment) in template.split('/').enumerate() {
            if i > 0 {
                rendered.push('/');
            }
            let value = segment
                .strip_prefix(':')
                .and_then(|name| self.get(name))
                .unwrap_or(segment);
            rendered.push_str(value);
        }
        rendered
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
