//! Per-node method slots.

use http::Method;
use smallvec::SmallVec;

/// Maps HTTP methods to route indices for a single tree node.
///
/// Most paths register one to three methods, so slots are stored inline.
#[derive(Debug, Clone, Default)]
pub(crate) struct MethodTable {
    slots: SmallVec<[(Method, usize); 4]>,
}

impl MethodTable {
    /// Registers `route` for `method`.
    ///
    /// Returns `false` if the method already has a route; the earlier
    /// registration is kept.
    pub(crate) fn insert(&mut self, method: Method, route: usize) -> bool {
        if self.get(&method).is_some() {
            return false;
        }
        self.slots.push((method, route));
        true
    }

    /// Returns the route index registered for `method`.
    pub(crate) fn get(&self, method: &Method) -> Option<usize> {
        self.slots
            .iter()
            .find(|(registered, _)| registered == method)
            .map(|(_, route)| *route)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
