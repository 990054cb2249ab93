//! A single route: pattern, matcher and handler.

use std::fmt;

use regex::bytes::{Regex, RegexBuilder};

use crate::RouterError;
use crate::r#match::Captures;

/// How a route decides whether a path belongs to it.
#[derive(Debug, Clone)]
enum Matcher {
    /// Exact, case-insensitive string comparison.
    Static,
    /// Anchored, case-insensitive ASCII regular expression.
    Dynamic(Regex),
}

/// A registered route.
///
/// Immutable once built; matching returns fresh [`Captures`] instead of
/// storing them on the route, so one route can be matched from many
/// threads at once.
pub struct Route<H> {
    pattern: String,
    matcher: Matcher,
    handler: H,
}

impl<H> Route<H> {
    /// Build a route.
    ///
    /// Patterns made only of `[a-z0-9/_-]` (ignoring case) are static and
    /// compared as plain strings. Anything else is compiled as a regular
    /// expression, anchored at both ends unless it already is. Classes such
    /// as `\d` and `\w` and case folding cover ASCII only.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for an empty pattern or one
    /// that does not compile.
    pub fn new(pattern: &str, handler: H) -> Result<Self, RouterError> {
        if pattern.is_empty() {
            return Err(RouterError::InvalidPattern {
                pattern: String::new(),
                detail: "pattern must not be empty".to_string(),
            });
        }

        let matcher = if is_static(pattern) {
            Matcher::Static
        } else {
            Matcher::Dynamic(compile(pattern)?)
        };
        Ok(Self {
            pattern: pattern.to_lowercase(),
            matcher,
            handler,
        })
    }

    /// The lowercased pattern, used as the route's identity.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns true if the route matches by plain string comparison.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self.matcher, Matcher::Static)
    }

    /// The bound handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Match `path`, returning its positional captures on success.
    ///
    /// Static routes always yield empty captures.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Captures> {
        match &self.matcher {
            Matcher::Static => path
                .eq_ignore_ascii_case(&self.pattern)
                .then(Captures::default),
            Matcher::Dynamic(regex) => regex.captures(path.as_bytes()).map(|caps| {
                caps.iter()
                    .skip(1)
                    .map(|group| {
                        group.map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                    })
                    .collect()
            }),
        }
    }
}

impl<H> fmt::Debug for Route<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("static", &self.is_static())
            .finish_non_exhaustive()
    }
}

fn is_static(pattern: &str) -> bool {
    pattern
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b'_' | b'-'))
}

fn compile(pattern: &str) -> Result<Regex, RouterError> {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    if !pattern.starts_with('^') {
        anchored.push('^');
    }
    anchored.push_str(pattern);
    if !pattern.ends_with('$') {
        anchored.push('$');
    }
    RegexBuilder::new(&anchored)
        .unicode(false)
        .case_insensitive(true)
        .build()
        .map_err(|err| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            detail: err.to_string(),
        })
}
