//! Core types for sluice.
//!
//! This crate provides the building blocks the rest of the workspace is made of:
//! - [`MultiDict`], the ordered multi-valued map behind query, form and cookie data
//! - [`SpooledBody`], a byte buffer that spills to a temporary file past a threshold
//! - [`FileUpload`] and the streaming [`MultipartParser`]
//! - [`Response`], [`IntoResponse`] and [`HttpError`]
//! - cookie parsing and [`SetCookie`] rendering
//!
//! Everything here is synchronous and transport-agnostic; request decoding
//! lives in `sluice-http`.

#![forbid(unsafe_code)]

pub mod cookie;
pub mod error;
pub mod multidict;
pub mod multipart;
pub mod response;
pub mod spool;
pub mod upload;

pub use cookie::{SetCookie, parse_cookie_header};
pub use error::HttpError;
pub use multidict::{MultiDict, MultiDictError};
pub use multipart::{MultipartConfig, MultipartError, MultipartParser, Part, parse_boundary};
pub use response::{
    BodyStream, DEFAULT_CONTENT_TYPE, GatewayResponse, IntoResponse, Json, Response, ResponseBody,
    StatusCode, UnknownStatus,
};
pub use spool::{MEMFILE_MAX, SpooledBody};
pub use upload::{FileUpload, SaveError, sanitize_filename};
