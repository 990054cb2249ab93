//! The application: route table, plugins and the dispatch loop.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use sluice_core::multipart::MultipartConfig;
use sluice_core::{GatewayResponse, HttpError, IntoResponse, Response, ResponseBody};
use sluice_http::{BodyConfig, Environ, Request};
use sluice_router::{Captures, RouteLookup, Router, RouterError};
use tracing::{debug, error};

use crate::plugin::{Plugin, PluginError, Plugins};

/// A boxed route handler.
///
/// Receives the request and the route's positional captures.
pub type Handler = Arc<dyn Fn(&Request, &Captures) -> Response + Send + Sync>;

/// Application-wide limits.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Body reading limits.
    pub body: BodyConfig,
    /// Multipart decoding limits.
    pub multipart: MultipartConfig,
}

impl AppConfig {
    /// Create a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the body reading limits.
    #[must_use]
    pub fn with_body(mut self, body: BodyConfig) -> Self {
        self.body = body;
        self
    }

    /// Set the multipart decoding limits.
    #[must_use]
    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }
}

/// A gateway application.
///
/// Routes and plugins are registered up front; [`App::call`] then takes
/// `&self` and may be invoked from many worker threads at once.
///
/// # Example
///
/// ```
/// use sluice::prelude::*;
///
/// let mut app = App::new();
/// app.route("/hello/([a-z]+)", |_req: &Request, caps: &Captures| {
///     format!("Hello, {}!", caps.get(0).unwrap_or("stranger"))
/// })
/// .unwrap();
///
/// let env = Environ::new().with(keys::PATH_INFO, "/hello/world");
/// let out = app.call(env);
/// assert_eq!(out.status, "200 OK");
/// assert_eq!(out.body_bytes().unwrap(), b"Hello, world!");
/// ```
pub struct App {
    config: AppConfig,
    router: Router<Handler>,
    plugins: Plugins,
}

impl Default for App {
    fn default() -> Self {
        Self::with_config(AppConfig::default())
    }
}

impl App {
    /// Create an application with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an application with explicit limits.
    #[must_use]
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            plugins: Plugins::new(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Register `callback` under `pattern`.
    ///
    /// The callback is wrapped by every installed plugin before it is
    /// stored. Plugins installed later do not affect existing routes.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::DuplicateRoute`] or
    /// [`RouterError::InvalidPattern`]; both should abort startup.
    pub fn route<F, R>(&mut self, pattern: &str, callback: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(&Request, &Captures) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        let handler: Handler = Arc::new(move |request, captures| {
            callback(request, captures).into_response()
        });
        self.router.register(pattern, self.plugins.apply(handler))?;
        Ok(self)
    }

    /// Install a plugin under a unique `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AlreadyInstalled`] if the name is taken.
    pub fn install<P: Plugin>(&mut self, name: &str, plugin: P) -> Result<&mut Self, PluginError> {
        self.plugins.install(name, plugin)?;
        debug!(name, "installed plugin");
        Ok(self)
    }

    /// Installed plugins.
    #[must_use]
    pub fn plugins(&self) -> &Plugins {
        &self.plugins
    }

    /// Registered routes.
    #[must_use]
    pub fn router(&self) -> &Router<Handler> {
        &self.router
    }

    /// Handle one request.
    ///
    /// Never fails: an unmatched path yields `404 Not Found`, a panicking
    /// handler yields the generic `500 Internal Server Error`.
    pub fn call(&self, environ: Environ) -> GatewayResponse {
        let request = Request::with_config(
            environ,
            self.config.body.clone(),
            self.config.multipart.clone(),
        );
        debug!(method = request.method(), path = request.path(), "dispatching request");

        match self.dispatch(&request).into_gateway() {
            Ok(response) => response,
            Err(err) => {
                error!(status = err.0, path = request.path(), "handler returned an unknown status");
                internal_error()
            }
        }
    }

    fn dispatch(&self, request: &Request) -> Response {
        let RouteLookup::Match(found) = self.router.lookup(request.path()) else {
            return Response::not_found("Not Found");
        };
        let handler = found.handler();
        match panic::catch_unwind(AssertUnwindSafe(|| handler(request, &found.captures))) {
            Ok(response) => response,
            Err(payload) => {
                error!(
                    path = request.path(),
                    pattern = found.route.pattern(),
                    panic = panic_message(payload.as_ref()),
                    "route handler panicked"
                );
                HttpError::internal().into_response()
            }
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<_> = self.router.routes().iter().map(|r| r.pattern()).collect();
        f.debug_struct("App")
            .field("config", &self.config)
            .field("routes", &patterns)
            .field("plugins", &self.plugins)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// The fixed 500 response, built without going through status lookup.
fn internal_error() -> GatewayResponse {
    let body = "Internal Server Error";
    GatewayResponse {
        status: "500 Internal Server Error".to_string(),
        headers: vec![
            (
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            ),
            ("Content-Length".to_string(), body.len().to_string()),
        ],
        body: ResponseBody::from(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::StatusCode;
    use sluice_http::keys;

    fn get(path: &str) -> Environ {
        Environ::new()
            .with(keys::REQUEST_METHOD, "GET")
            .with(keys::PATH_INFO, path)
    }

    #[test]
    fn duplicate_route_is_a_setup_error() {
        let mut app = App::new();
        app.route("/a", |_: &Request, _: &Captures| "a").unwrap();
        assert!(matches!(
            app.route("/A", |_: &Request, _: &Captures| "b"),
            Err(RouterError::DuplicateRoute { .. })
        ));
    }

    #[test]
    fn unknown_status_becomes_internal_error() {
        let mut app = App::new();
        app.route("/odd", |_: &Request, _: &Captures| {
            Response::with_status(StatusCode::from_u16(799))
        })
        .unwrap();
        let out = app.call(get("/odd"));
        assert_eq!(out.status, "500 Internal Server Error");
        assert_eq!(out.body_bytes().unwrap(), b"Internal Server Error");
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }

    #[test]
    fn debug_lists_routes() {
        let mut app = App::new();
        app.route("/x", |_: &Request, _: &Captures| ()).unwrap();
        assert!(format!("{app:?}").contains("\"/x\""));
    }
}
