//! The ordered route table.

use tracing::debug;

use crate::r#match::{RouteLookup, RouteMatch};
use crate::{Route, RouterError};

/// Routes in registration order.
///
/// Register everything before serving; [`Router::lookup`] takes `&self`
/// and keeps no per-call state, so a built router can be shared freely.
#[derive(Debug)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> Router<H> {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::DuplicateRoute`] if a route with the same
    /// lowercased pattern exists, or [`RouterError::InvalidPattern`] if the
    /// pattern is rejected.
    pub fn register(&mut self, pattern: &str, handler: H) -> Result<&Route<H>, RouterError> {
        let route = Route::new(pattern, handler)?;
        if self.get(route.pattern()).is_some() {
            return Err(RouterError::DuplicateRoute {
                pattern: route.pattern().to_string(),
            });
        }
        debug!(
            pattern = route.pattern(),
            is_static = route.is_static(),
            "registered route"
        );
        let index = self.routes.len();
        self.routes.push(route);
        Ok(&self.routes[index])
    }

    /// Find the first route matching `path`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> RouteLookup<'_, H> {
        self.routes
            .iter()
            .find_map(|route| {
                route
                    .matches(path)
                    .map(|captures| RouteMatch { route, captures })
            })
            .map_or(RouteLookup::NotFound, RouteLookup::Match)
    }

    /// Route registered under `pattern` (compared lowercased).
    #[must_use]
    pub fn get(&self, pattern: &str) -> Option<&Route<H>> {
        let pattern = pattern.to_lowercase();
        self.routes.iter().find(|route| route.pattern() == pattern)
    }

    /// All routes in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Route<H>] {
        &self.routes
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
