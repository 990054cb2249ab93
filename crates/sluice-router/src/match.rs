//! Route matching result.

use crate::Route;

/// Positional capture values from a dynamic route.
///
/// A group that did not take part in the match is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(Vec<Option<String>>);

impl Captures {
    /// Value of the capture group at `index` (0 is the first group).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(Option::as_deref)
    }

    /// Number of capture groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for a static route or a regex without groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All groups in order.
    #[must_use]
    pub fn as_slice(&self) -> &[Option<String>] {
        &self.0
    }

    /// Iterate over the groups in order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> {
        self.0.iter().map(Option::as_deref)
    }
}

impl FromIterator<Option<String>> for Captures {
    fn from_iter<I: IntoIterator<Item = Option<String>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A matched route with its captures.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    /// The matched route.
    pub route: &'a Route<H>,
    /// Captured path segments.
    pub captures: Captures,
}

impl<H> RouteMatch<'_, H> {
    /// The matched route's handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        self.route.handler()
    }
}

/// Result of attempting to locate a route by path.
#[derive(Debug)]
pub enum RouteLookup<'a, H> {
    /// The first route, in registration order, that matched.
    Match(RouteMatch<'a, H>),
    /// No route matched the path.
    NotFound,
}

impl<'a, H> RouteLookup<'a, H> {
    /// Convert into an `Option`.
    #[must_use]
    pub fn into_match(self) -> Option<RouteMatch<'a, H>> {
        match self {
            Self::Match(found) => Some(found),
            Self::NotFound => None,
        }
    }
}
