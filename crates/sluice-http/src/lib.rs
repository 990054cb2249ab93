//! Request decoding for sluice.
//!
//! This crate turns a gateway environment into a [`Request`] whose fields
//! are derived lazily and cached for the lifetime of the request.
//!
//! # Features
//!
//! - Gateway [`Environ`] with CGI-style variable names
//! - Chunked transfer decoding and length-bounded body reading
//! - Body materialization that spills to a temporary file past a threshold
//! - Query string and url-encoded form parsing with percent-decoding
//! - Multipart form splitting into text fields and [`FileUpload`](sluice_core::FileUpload)s
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use sluice_http::{Environ, Request, keys};
//!
//! let env = Environ::new()
//!     .with(keys::REQUEST_METHOD, "POST")
//!     .with(keys::PATH_INFO, "/login")
//!     .with(keys::CONTENT_LENGTH, "19")
//!     .with_input(Cursor::new(b"user=ann&remember=1".to_vec()));
//! let request = Request::new(env);
//!
//! assert_eq!(request.path(), "/login");
//! assert_eq!(request.form().unwrap().get("user").map(String::as_str), Some("ann"));
//! ```

#![forbid(unsafe_code)]

pub mod body;
pub mod environ;
pub mod form;
pub mod materialize;
pub mod query;
mod request;

pub use body::{
    BodyChunks, BodyConfig, BodyError, ChunkedReader, DEFAULT_BUFSIZE, LengthReader,
};
pub use environ::{Environ, Input, header_key, keys};
pub use form::{FormSource, ParsedForm, parse_form};
pub use materialize::materialize;
pub use query::{parse_urlencoded, percent_decode};
pub use request::{Request, UrlParts};
