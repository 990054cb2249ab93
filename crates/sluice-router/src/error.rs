//! Route registration errors.

/// Errors raised while registering routes.
///
/// Both are setup-time mistakes; an application should fail to start
/// rather than serve with a partial route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// A route with the same (case-insensitive) pattern already exists.
    DuplicateRoute {
        /// The lowercased pattern.
        pattern: String,
    },
    /// The pattern is empty or not a valid regular expression.
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Why it was rejected.
        detail: String,
    },
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateRoute { pattern } => {
                write!(f, "route already registered: {pattern}")
            }
            Self::InvalidPattern { pattern, detail } => {
                write!(f, "invalid route pattern {pattern:?}: {detail}")
            }
        }
    }
}

impl std::error::Error for RouterError {}
