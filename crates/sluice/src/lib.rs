//! A minimal request/response pipeline over a server gateway interface.
//!
//! sluice sits between a server that hands over CGI-style environments and
//! the application code that answers them:
//!
//! - **Lazy requests** - every request field is derived on first use and
//!   cached; the body is read once and spooled to disk when large
//! - **Form decoding** - url-encoded and multipart bodies, with uploads
//!   kept apart from text fields
//! - **Ordered routing** - static and regex routes, first match wins
//! - **Plain responses** - handlers return anything that implements
//!   [`IntoResponse`]; failures become structured error responses
//!
//! # Quick Start
//!
//! ```
//! use std::io::Cursor;
//! use sluice::prelude::*;
//!
//! let mut app = App::new();
//! app.route("/users/([0-9]+)", |_req: &Request, caps: &Captures| {
//!     format!("user {}", caps.get(0).unwrap_or_default())
//! })
//! .unwrap();
//! app.route("/echo", |req: &Request, _: &Captures| -> Result<String, HttpError> {
//!     let form = req.form()?;
//!     Ok(form.get("msg").cloned().unwrap_or_default())
//! })
//! .unwrap();
//!
//! let out = app.call(Environ::new().with(keys::PATH_INFO, "/users/7"));
//! assert_eq!(out.body_bytes().unwrap(), b"user 7");
//!
//! let env = Environ::new()
//!     .with(keys::REQUEST_METHOD, "POST")
//!     .with(keys::PATH_INFO, "/echo")
//!     .with(keys::CONTENT_LENGTH, "6")
//!     .with_input(Cursor::new(b"msg=hi".to_vec()));
//! assert_eq!(app.call(env).body_bytes().unwrap(), b"hi");
//! ```
//!
//! # Crate Structure
//!
//! - [`sluice_core`] - `MultiDict`, spooled bodies, uploads, multipart, responses
//! - [`sluice_http`] - gateway environment, body readers, form parsing, `Request`
//! - [`sluice_router`] - ordered static/regex router

#![forbid(unsafe_code)]

mod app;
mod plugin;
pub mod static_files;

pub use sluice_core as core;
pub use sluice_http as http;
pub use sluice_router as router;

pub use app::{App, AppConfig, Handler};
pub use plugin::{Plugin, PluginError, Plugins};
pub use static_files::{Disposition, SendFileOptions, StaticFileError, send_file};

pub use sluice_core::{
    FileUpload, GatewayResponse, HttpError, IntoResponse, Json, MultiDict, MultiDictError,
    Response, ResponseBody, SaveError, SetCookie, StatusCode,
};
pub use sluice_http::{BodyConfig, BodyError, Environ, Request, UrlParts, keys};
pub use sluice_router::{Captures, RouterError};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        App, AppConfig, BodyError, Captures, Environ, FileUpload, HttpError, IntoResponse, Json,
        MultiDict, Plugin, Request, Response, SetCookie, StatusCode, keys, send_file,
    };
    pub use serde::{Deserialize, Serialize};
}
