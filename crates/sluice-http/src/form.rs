//! Form decoding for request bodies.
//!
//! `multipart/*` bodies go through the streaming
//! [`MultipartParser`](sluice_core::MultipartParser); anything else is read
//! as `application/x-www-form-urlencoded`.

use std::io::{Read, Seek};

use sluice_core::multipart::{MultipartConfig, MultipartParser, parse_boundary};
use sluice_core::{FileUpload, MultiDict, SpooledBody};

use crate::body::BodyError;
use crate::query::parse_urlencoded;

/// Decoded form data: text fields and uploaded files, split by kind.
///
/// A name used by both a file part and a text part appears in both maps,
/// so neither shadows the other.
#[derive(Debug, Default)]
pub struct ParsedForm {
    /// Text fields, in submission order.
    pub fields: MultiDict<String>,
    /// File uploads, in submission order.
    pub files: MultiDict<FileUpload>,
}

/// What [`parse_form`] needs to know about the request.
#[derive(Debug, Clone, Copy)]
pub struct FormSource<'a> {
    /// `Content-Type` exactly as sent; the multipart boundary is case-sensitive.
    pub content_type: &'a str,
    /// Declared `Content-Length` (0 when absent).
    pub content_length: u64,
    /// Whether the body was sent chunked, in which case its real size counts.
    pub chunked: bool,
    /// Ceiling for url-encoded bodies.
    pub memfile_max: usize,
}

/// Decode the materialized `body` into form fields and files.
///
/// The body is rewound before and after parsing so it can be read again.
pub fn parse_form(
    source: FormSource<'_>,
    body: &mut SpooledBody,
    multipart: &MultipartConfig,
) -> Result<ParsedForm, BodyError> {
    body.rewind()?;
    let form = if is_multipart(source.content_type) {
        parse_multipart(source.content_type, body, multipart)
    } else {
        parse_urlencoded_body(source, body)
    };
    body.rewind()?;
    form
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/"))
}

fn parse_multipart(
    content_type: &str,
    body: &mut SpooledBody,
    config: &MultipartConfig,
) -> Result<ParsedForm, BodyError> {
    let boundary = parse_boundary(content_type)?;
    let parts = MultipartParser::new(&boundary, config.clone()).parse(&mut *body)?;

    let mut form = ParsedForm::default();
    for mut part in parts {
        if part.is_file() {
            let name = part.name.clone();
            form.files.append(name, part.into_upload());
        } else {
            let value = part.text()?;
            form.fields.append(part.name, value);
        }
    }
    Ok(form)
}

fn parse_urlencoded_body(
    source: FormSource<'_>,
    body: &mut SpooledBody,
) -> Result<ParsedForm, BodyError> {
    let size = if source.chunked {
        body.len()
    } else {
        source.content_length
    };
    if size > source.memfile_max as u64 {
        return Err(BodyError::PayloadTooLarge {
            size,
            max: source.memfile_max,
        });
    }

    let mut raw = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
    body.by_ref().take(size).read_to_end(&mut raw)?;
    let text = String::from_utf8_lossy(&raw);
    Ok(ParsedForm {
        fields: parse_urlencoded(&text),
        files: MultiDict::new(),
    })
}
