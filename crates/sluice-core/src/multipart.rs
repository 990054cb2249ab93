//! Multipart form data parser.
//!
//! Decodes `multipart/*` bodies (RFC 2046 / RFC 7578) from any [`Read`]
//! source. Part payloads are streamed into [`SpooledBody`] buffers, so a large
//! upload is spilled to a temporary file instead of being held in memory.

use std::io::{self, Read, Seek, Write};

use memchr::memmem::Finder;

use crate::spool::SpooledBody;
use crate::upload::FileUpload;

/// Default threshold for spooling part payloads to a temporary file (100 KiB).
pub const DEFAULT_SPOOL_THRESHOLD: usize = crate::spool::MEMFILE_MAX;

/// Default maximum number of parts.
pub const DEFAULT_MAX_FIELDS: usize = 1000;

/// Default maximum size of one part's header block (16 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 16 * 1024;

/// Default size of each read from the source (64 KiB).
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// RFC 2046 limits boundaries to 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

const CRLF: &[u8] = b"\r\n";

/// Configuration for multipart parsing.
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    spool_threshold: usize,
    max_fields: usize,
    max_header_size: usize,
    read_chunk: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            max_fields: DEFAULT_MAX_FIELDS,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

impl MultipartConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size above which a part payload is spooled to disk.
    #[must_use]
    pub fn with_spool_threshold(mut self, size: usize) -> Self {
        self.spool_threshold = size;
        self
    }

    /// Set the maximum number of parts.
    #[must_use]
    pub fn with_max_fields(mut self, count: usize) -> Self {
        self.max_fields = count;
        self
    }

    /// Set the maximum size of a part header block.
    #[must_use]
    pub fn with_max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    /// Set the size of each read from the source. Zero is treated as one.
    #[must_use]
    pub fn with_read_chunk(mut self, size: usize) -> Self {
        self.read_chunk = size.max(1);
        self
    }

    /// Spool-to-disk threshold.
    #[must_use]
    pub fn spool_threshold(&self) -> usize {
        self.spool_threshold
    }

    /// Maximum number of parts.
    #[must_use]
    pub fn max_fields(&self) -> usize {
        self.max_fields
    }

    /// Maximum size of a part header block.
    #[must_use]
    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    /// Size of each read from the source.
    #[must_use]
    pub fn read_chunk(&self) -> usize {
        self.read_chunk
    }
}

/// Errors that can occur during multipart parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartError {
    /// Missing boundary in Content-Type header.
    MissingBoundary,
    /// Invalid boundary format, or not a multipart content type.
    InvalidBoundary,
    /// Too many parts.
    TooManyFields { max: usize },
    /// A part header block exceeded the configured limit.
    HeaderTooLarge { max: usize },
    /// Missing Content-Disposition header.
    MissingContentDisposition,
    /// Invalid Content-Disposition header.
    InvalidContentDisposition { detail: &'static str },
    /// The body ended before the closing delimiter.
    UnexpectedEof,
    /// Invalid multipart framing.
    InvalidFormat { detail: &'static str },
    /// I/O error while reading or spooling.
    Io { detail: String },
}

impl std::fmt::Display for MultipartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBoundary => write!(f, "missing boundary in multipart Content-Type"),
            Self::InvalidBoundary => write!(f, "invalid multipart boundary"),
            Self::TooManyFields { max } => write!(f, "too many fields: limit is {max}"),
            Self::HeaderTooLarge { max } => {
                write!(f, "part header block exceeds limit of {max} bytes")
            }
            Self::MissingContentDisposition => {
                write!(f, "missing Content-Disposition header in part")
            }
            Self::InvalidContentDisposition { detail } => {
                write!(f, "invalid Content-Disposition: {detail}")
            }
            Self::UnexpectedEof => write!(f, "unexpected end of multipart data"),
            Self::InvalidFormat { detail } => write!(f, "invalid multipart format: {detail}"),
            Self::Io { detail } => write!(f, "multipart I/O error: {detail}"),
        }
    }
}

impl std::error::Error for MultipartError {}

impl From<io::Error> for MultipartError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            detail: err.to_string(),
        }
    }
}

/// One decoded part of a multipart body.
#[derive(Debug)]
pub struct Part {
    /// Field name from Content-Disposition.
    pub name: String,
    /// Filename from Content-Disposition, if the parameter was present.
    pub filename: Option<String>,
    /// Part headers in wire order, names as sent.
    pub headers: Vec<(String, String)>,
    /// Buffered payload, positioned at the start.
    pub data: SpooledBody,
}

impl Part {
    /// Returns true if this part carries a non-empty filename.
    ///
    /// A browser submitting an empty file input sends `filename=""`; such
    /// parts are treated as ordinary fields.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.filename.as_deref().is_some_and(|f| !f.is_empty())
    }

    /// Returns true if this part is a regular form field.
    #[must_use]
    pub fn is_field(&self) -> bool {
        !self.is_file()
    }

    /// `Content-Type` header of the part, if present.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&mut self) -> io::Result<String> {
        let bytes = self.data.contents()?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }

    /// Turn a file part into a [`FileUpload`].
    #[must_use]
    pub fn into_upload(self) -> FileUpload {
        FileUpload::new(
            self.name,
            self.filename.unwrap_or_default(),
            self.headers,
            self.data,
        )
    }
}

/// Extract the boundary from a `multipart/*` Content-Type value.
///
/// Format: `multipart/form-data; boundary=----WebKitFormBoundary...`
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut params = content_type.split(';');
    let main = params.next().unwrap_or("").trim();
    let is_multipart = main
        .split_once('/')
        .is_some_and(|(kind, sub)| kind.eq_ignore_ascii_case("multipart") && !sub.is_empty());
    if !is_multipart {
        return Err(MultipartError::InvalidBoundary);
    }

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = unquote(value.trim());
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                return Err(MultipartError::InvalidBoundary);
            }
            return Ok(boundary);
        }
    }

    Err(MultipartError::MissingBoundary)
}

/// Streaming multipart parser for one boundary.
#[derive(Debug)]
pub struct MultipartParser {
    /// `CRLF--boundary`; the leading CRLF belongs to the delimiter.
    delimiter: Vec<u8>,
    finder: Finder<'static>,
    config: MultipartConfig,
}

impl MultipartParser {
    /// Create a parser for `boundary` (without the leading dashes).
    #[must_use]
    pub fn new(boundary: &str, config: MultipartConfig) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());
        let finder = Finder::new(&delimiter).into_owned();
        Self {
            delimiter,
            finder,
            config,
        }
    }

    /// Decode every part from `source`.
    ///
    /// The preamble before the first delimiter and the epilogue after the
    /// closing delimiter are ignored.
    pub fn parse<R: Read>(&self, source: R) -> Result<Vec<Part>, MultipartError> {
        let mut scanner = Scanner::new(source, self.config.read_chunk);
        let mut parts = Vec::new();

        // The body's first delimiter may sit at offset zero without a
        // preceding CRLF; seeding one lets every delimiter share a pattern.
        scanner.buf.extend_from_slice(CRLF);
        self.skip_preamble(&mut scanner)?;

        loop {
            match self.delimiter_suffix(&mut scanner)? {
                Suffix::Close => return Ok(parts),
                Suffix::Next => {}
            }
            if parts.len() >= self.config.max_fields {
                return Err(MultipartError::TooManyFields {
                    max: self.config.max_fields,
                });
            }
            let headers = self.read_headers(&mut scanner)?;
            let (name, filename) = disposition(&headers)?;
            let data = self.read_payload(&mut scanner)?;
            parts.push(Part {
                name,
                filename,
                headers,
                data,
            });
        }
    }

    /// Advance past the first delimiter that is followed by CRLF or `--`.
    fn skip_preamble<R: Read>(&self, scanner: &mut Scanner<R>) -> Result<(), MultipartError> {
        let mut from = 0;
        loop {
            if let Some(found) = self.finder.find(&scanner.buf[from..]).map(|i| from + i) {
                let end = found + self.delimiter.len();
                if scanner.buf.len() < end + 2 {
                    if !scanner.fill()? {
                        return Err(MultipartError::UnexpectedEof);
                    }
                    continue;
                }
                if is_delimiter_suffix(&scanner.buf[end..end + 2]) {
                    scanner.buf.drain(..end);
                    return Ok(());
                }
                from = found + 1;
                continue;
            }
            let keep = self.delimiter.len().saturating_sub(1);
            let drop = scanner.buf.len().saturating_sub(keep);
            scanner.buf.drain(..drop);
            from = 0;
            if !scanner.fill()? {
                return Err(MultipartError::UnexpectedEof);
            }
        }
    }

    /// Consume the two bytes after a delimiter.
    fn delimiter_suffix<R: Read>(&self, scanner: &mut Scanner<R>) -> Result<Suffix, MultipartError> {
        while scanner.buf.len() < 2 {
            if !scanner.fill()? {
                return Err(MultipartError::UnexpectedEof);
            }
        }
        let suffix = match &scanner.buf[..2] {
            b"--" => Suffix::Close,
            b"\r\n" => Suffix::Next,
            _ => {
                return Err(MultipartError::InvalidFormat {
                    detail: "delimiter must be followed by CRLF or \"--\"",
                });
            }
        };
        scanner.buf.drain(..2);
        Ok(suffix)
    }

    /// Read a header block up to and including its blank line.
    fn read_headers<R: Read>(
        &self,
        scanner: &mut Scanner<R>,
    ) -> Result<Vec<(String, String)>, MultipartError> {
        let max = self.config.max_header_size;
        loop {
            if scanner.buf.starts_with(CRLF) {
                scanner.buf.drain(..2);
                return Ok(Vec::new());
            }
            if let Some(end) = memchr::memmem::find(&scanner.buf, b"\r\n\r\n") {
                if end > max {
                    return Err(MultipartError::HeaderTooLarge { max });
                }
                let headers = parse_header_block(&scanner.buf[..end]);
                scanner.buf.drain(..end + 4);
                return Ok(headers);
            }
            if scanner.buf.len() > max + 4 {
                return Err(MultipartError::HeaderTooLarge { max });
            }
            if !scanner.fill()? {
                return Err(MultipartError::UnexpectedEof);
            }
        }
    }

    /// Stream a part payload into a spool until the next real delimiter.
    ///
    /// On return the scanner is positioned right after that delimiter.
    fn read_payload<R: Read>(&self, scanner: &mut Scanner<R>) -> Result<SpooledBody, MultipartError> {
        let mut data = SpooledBody::new(self.config.spool_threshold);
        let mut from = 0;
        loop {
            if let Some(found) = self.finder.find(&scanner.buf[from..]).map(|i| from + i) {
                let end = found + self.delimiter.len();
                if scanner.buf.len() < end + 2 {
                    if !scanner.fill()? {
                        return Err(MultipartError::UnexpectedEof);
                    }
                    continue;
                }
                if is_delimiter_suffix(&scanner.buf[end..end + 2]) {
                    data.write_all(&scanner.buf[..found])?;
                    scanner.buf.drain(..end);
                    data.rewind()?;
                    return Ok(data);
                }
                from = found + 1;
                continue;
            }

            // Everything except a possible delimiter prefix at the tail is payload.
            let keep = self.delimiter.len() + 1;
            if scanner.buf.len() > keep {
                let flush = scanner.buf.len() - keep;
                data.write_all(&scanner.buf[..flush])?;
                scanner.buf.drain(..flush);
            }
            from = 0;
            if !scanner.fill()? {
                return Err(MultipartError::UnexpectedEof);
            }
        }
    }
}

enum Suffix {
    Next,
    Close,
}

fn is_delimiter_suffix(bytes: &[u8]) -> bool {
    bytes == CRLF || bytes == b"--"
}

/// Pull-based byte window over a reader.
struct Scanner<R> {
    source: R,
    buf: Vec<u8>,
    chunk: usize,
}

impl<R: Read> Scanner<R> {
    fn new(source: R, chunk: usize) -> Self {
        Self {
            source,
            buf: Vec::new(),
            chunk: chunk.max(1),
        }
    }

    /// Append one read's worth of bytes. Returns false at end of input.
    fn fill(&mut self) -> io::Result<bool> {
        let start = self.buf.len();
        self.buf.resize(start + self.chunk, 0);
        loop {
            match self.source.read(&mut self.buf[start..]) {
                Ok(n) => {
                    self.buf.truncate(start + n);
                    return Ok(n > 0);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.buf.truncate(start);
                    return Err(err);
                }
            }
        }
    }
}

/// Split a raw header block into `(name, value)` pairs.
///
/// Continuation lines (leading whitespace) are folded into the previous value.
/// Lines without a colon are skipped.
fn parse_header_block(block: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(block);
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.split("\r\n") {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

/// Field name and optional filename from a part's Content-Disposition.
fn disposition(headers: &[(String, String)]) -> Result<(String, Option<String>), MultipartError> {
    let value = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-disposition"))
        .map(|(_, value)| value.as_str())
        .ok_or(MultipartError::MissingContentDisposition)?;
    parse_content_disposition(value)
}

/// Parse a Content-Disposition header value.
///
/// Format: `form-data; name="field"; filename="file.txt"`. Parameter names
/// are case-insensitive; `;` inside quoted values does not split.
fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), MultipartError> {
    let mut name = None;
    let mut filename = None;

    for param in split_params(value).into_iter().skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw.trim()));
        } else if key.eq_ignore_ascii_case("filename") {
            filename = Some(unquote(raw.trim()));
        }
    }

    let name = name.ok_or(MultipartError::InvalidContentDisposition {
        detail: "missing name parameter",
    })?;
    Ok((name, filename))
}

fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, ch) in value.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

/// Strip surrounding quotes, unescaping `\"` and `\\` inside double quotes.
fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        let inner = &s[1..s.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                match chars.next() {
                    Some(next @ ('"' | '\\')) => out.push(next),
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                }
            } else {
                out.push(ch);
            }
        }
        out
    } else if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}
