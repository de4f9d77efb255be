//! Radix tree node implementation.
//!
//! Each node represents one path segment. Static children are kept sorted so
//! they can be found by binary search; all parameter segments at one depth
//! share a single parameter child, whatever their names. Names are resolved
//! later from the matched route entry, so `/users/:id` and `/users/:uid`
//! occupy the same node.

use http::Method;
use smallvec::SmallVec;

use crate::method_table::MethodTable;

/// One segment of a route pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    /// Literal segment (e.g. `users`).
    Static(&'a str),
    /// Named parameter (e.g. `:id`), stored without the colon.
    Param(&'a str),
}

impl Segment<'_> {
    pub(crate) const fn is_static(&self) -> bool {
        matches!(self, Segment::Static(_))
    }
}

/// Splits a pattern into segments. Empty segments are ignored.
pub(crate) fn parse_pattern(pattern: &str) -> Vec<Segment<'_>> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name),
            None => Segment::Static(s),
        })
        .collect()
}

/// Positional parameter values captured during a lookup.
pub(crate) type Captures<'p> = SmallVec<[&'p str; 4]>;

/// A terminal node that accepts the method: route index plus captures.
pub(crate) type Candidate<'p> = (usize, Captures<'p>);

/// A node in the radix tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    /// The literal segment this node represents (empty for root and params)
    segment: String,

    /// Static children, sorted by segment
    static_children: Vec<Node>,

    /// Shared parameter child
    param_child: Option<Box<Node>>,

    /// Routes terminating at this node
    methods: MethodTable,
}

impl Node {
    /// Creates a root node.
    pub(crate) fn root() -> Self {
        Self::default()
    }

    fn with_segment(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            ..Self::default()
        }
    }

    /// Inserts a route. Returns `false` if the method was already registered
    /// at this path shape.
    pub(crate) fn insert(
        &mut self,
        segments: &[Segment<'_>],
        method: &Method,
        route: usize,
    ) -> bool {
        let Some((first, rest)) = segments.split_first() else {
            return self.methods.insert(method.clone(), route);
        };

        match *first {
            Segment::Static(segment) => {
                let index = match self
                    .static_children
                    .binary_search_by(|child| child.segment.as_str().cmp(segment))
                {
                    Ok(index) => index,
                    Err(index) => {
                        self.static_children.insert(index, Node::with_segment(segment));
                        index
                    }
                };
                self.static_children[index].insert(rest, method, route)
            }
            Segment::Param(_) => self
                .param_child
                .get_or_insert_with(Box::default)
                .insert(rest, method, route),
        }
    }

    /// Collects every route that matches `segments` for `method`.
    ///
    /// Unlike a first-match walk this explores both the static and the
    /// parameter branch at every depth, so the caller can rank candidates by
    /// specificity across the whole tree.
    pub(crate) fn collect<'p>(
        &self,
        segments: &[&'p str],
        method: &Method,
        captures: &mut Captures<'p>,
        out: &mut Vec<Candidate<'p>>,
    ) {
        let Some((first, rest)) = segments.split_first() else {
            if let Some(route) = self.methods.get(method) {
                out.push((route, captures.clone()));
            }
            return;
        };

        if let Some(child) = self.find_static_child(first) {
            child.collect(rest, method, captures, out);
        }

        if let Some(child) = &self.param_child {
            captures.push(*first);
            child.collect(rest, method, captures, out);
            captures.pop();
        }
    }

    fn find_static_child(&self, segment: &str) -> Option<&Node> {
        self.static_children
            .binary_search_by(|child| child.segment.as_str().cmp(segment))
            .ok()
            .map(|index| &self.static_children[index])
    }
}
