//! Ordered HTTP route matching.
//!
//! Routes are tried in registration order and the first match wins.
//!
//! # Features
//!
//! - Static routes (`/users`) compared as plain, case-insensitive strings
//! - Regex routes (`/users/([0-9]+)`) with positional captures
//! - Duplicate patterns rejected at registration
//! - Matching returns its captures; routes hold no per-call state
//!
//! # Example
//!
//! ```
//! use sluice_router::{RouteLookup, Router};
//!
//! let mut router = Router::new();
//! router.register("/users/([0-9]+)", "show_user").unwrap();
//!
//! let RouteLookup::Match(found) = router.lookup("/users/42") else {
//!     panic!("no route");
//! };
//! assert_eq!(*found.handler(), "show_user");
//! assert_eq!(found.captures.get(0), Some("42"));
//! ```

#![forbid(unsafe_code)]

mod error;
mod r#match;
mod route;
mod router;

pub use error::RouterError;
pub use r#match::{Captures, RouteLookup, RouteMatch};
pub use route::Route;
pub use router::Router;
