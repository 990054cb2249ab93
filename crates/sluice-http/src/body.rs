//! HTTP request body decoding.
//!
//! This module turns the gateway's raw input stream into a sequence of body
//! chunks:
//! - [`ChunkedReader`] decodes `Transfer-Encoding: chunked`
//! - [`LengthReader`] delivers at most `Content-Length` bytes
//!
//! Both are lazy, single-pass iterators of `Result<Vec<u8>, BodyError>`.
//! [`materialize`](crate::materialize::materialize) drains them into a
//! [`SpooledBody`](sluice_core::SpooledBody).
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use sluice_http::body::{BodyConfig, ChunkedReader};
//!
//! let input = Cursor::new(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n".to_vec());
//! let body: Vec<u8> = ChunkedReader::new(input, &BodyConfig::default())
//!     .collect::<Result<Vec<_>, _>>()
//!     .unwrap()
//!     .concat();
//! assert_eq!(body, b"Wikipedia");
//! ```

use std::io::{self, BufRead, BufReader, Read};

use sluice_core::{HttpError, IntoResponse, MEMFILE_MAX, MultipartError, Response, StatusCode};
use tracing::warn;

use crate::query::hex_digit;

/// Default largest single read, and longest accepted chunk-size line (100 KiB).
pub const DEFAULT_BUFSIZE: usize = 102_400;

/// Configuration for body reading.
#[derive(Debug, Clone)]
pub struct BodyConfig {
    /// Bytes kept in memory before a body spills to a temporary file.
    memfile_max: usize,
    /// Largest single read, and longest chunk-size line.
    bufsize: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            memfile_max: MEMFILE_MAX,
            bufsize: DEFAULT_BUFSIZE,
        }
    }
}

impl BodyConfig {
    /// Create a new body configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the in-memory ceiling.
    ///
    /// This also bounds url-encoded bodies, which are always held in memory.
    #[must_use]
    pub fn with_memfile_max(mut self, size: usize) -> Self {
        self.memfile_max = size;
        self
    }

    /// Set the read size. Zero is treated as one.
    #[must_use]
    pub fn with_bufsize(mut self, size: usize) -> Self {
        self.bufsize = size.max(1);
        self
    }

    /// Returns the in-memory ceiling.
    #[must_use]
    pub fn memfile_max(&self) -> usize {
        self.memfile_max
    }

    /// Returns the read size.
    #[must_use]
    pub fn bufsize(&self) -> usize {
        self.bufsize
    }
}

/// Error types for body reading and form decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// Invalid chunked transfer encoding.
    MalformedChunkedBody {
        /// Description of the error.
        detail: &'static str,
    },
    /// A body that must be held in memory is larger than allowed.
    PayloadTooLarge {
        /// The declared or actual size.
        size: u64,
        /// The maximum allowed size.
        max: usize,
    },
    /// The multipart decoder rejected the body.
    Multipart(MultipartError),
    /// Reading the input or writing the spool failed.
    Io {
        /// Description of the underlying I/O error.
        detail: String,
    },
}

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedChunkedBody { detail } => write!(f, "malformed chunked body: {detail}"),
            Self::PayloadTooLarge { size, max } => {
                write!(f, "payload too large: {size} bytes exceeds limit of {max}")
            }
            Self::Multipart(e) => write!(f, "multipart error: {e}"),
            Self::Io { detail } => write!(f, "body I/O error: {detail}"),
        }
    }
}

impl std::error::Error for BodyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Multipart(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BodyError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            detail: err.to_string(),
        }
    }
}

impl From<MultipartError> for BodyError {
    fn from(err: MultipartError) -> Self {
        Self::Multipart(err)
    }
}

impl From<BodyError> for HttpError {
    fn from(err: BodyError) -> Self {
        warn!(error = %err, "request body could not be decoded");
        match err {
            BodyError::MalformedChunkedBody { .. } => {
                HttpError::bad_request("Error while parsing chunked transfer body.")
            }
            BodyError::PayloadTooLarge { .. } => HttpError::new(StatusCode::PAYLOAD_TOO_LARGE)
                .with_message("Request entity too large"),
            BodyError::Multipart(_) | BodyError::Io { .. } => HttpError::internal(),
        }
    }
}

impl IntoResponse for BodyError {
    fn into_response(self) -> Response {
        HttpError::from(self).into_response()
    }
}

/// Single `read` into a fresh buffer of at most `max` bytes, retrying on
/// `Interrupted`. An empty result means end of stream.
fn read_up_to<R: Read + ?Sized>(source: &mut R, max: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; max];
    loop {
        match source.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// Content-Length Reader
// ============================================================================

/// Yields at most `content_length` bytes, `bufsize` at a time.
///
/// A source that ends early simply ends the sequence.
#[derive(Debug)]
pub struct LengthReader<R> {
    source: R,
    remaining: u64,
    bufsize: usize,
}

impl<R: Read> LengthReader<R> {
    /// Create a reader for `content_length` bytes of `source`.
    #[must_use]
    pub fn new(source: R, content_length: u64, config: &BodyConfig) -> Self {
        Self {
            source,
            remaining: content_length,
            bufsize: config.bufsize,
        }
    }

    /// Bytes still expected.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read> Iterator for LengthReader<R> {
    type Item = Result<Vec<u8>, BodyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let want = usize::try_from(self.remaining).map_or(self.bufsize, |r| r.min(self.bufsize));
        match read_up_to(&mut self.source, want) {
            Ok(chunk) if chunk.is_empty() => {
                self.remaining = 0;
                None
            }
            Ok(chunk) => {
                self.remaining -= chunk.len() as u64;
                Some(Ok(chunk))
            }
            Err(err) => {
                self.remaining = 0;
                Some(Err(err.into()))
            }
        }
    }
}

// ============================================================================
// Chunked Reader
// ============================================================================

/// State machine for chunked encoding decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Expecting a chunk-size line.
    Header,
    /// Reading chunk data.
    Data { remaining: usize },
    /// Expecting CRLF after chunk data.
    DataEnd,
    /// The zero-size chunk was seen.
    Complete,
    /// An error was returned; nothing more is produced.
    Failed,
}

/// Decodes chunked transfer encoding from a byte stream.
///
/// Chunked encoding format:
/// ```text
/// chunk-size [; extensions] CRLF
/// chunk-data CRLF
/// ...
/// 0 CRLF
/// ```
///
/// Extensions are discarded and trailers after the last chunk are not read.
/// Chunk data is produced in pieces of at most `bufsize` bytes.
#[derive(Debug)]
pub struct ChunkedReader<R> {
    source: BufReader<R>,
    state: ChunkedState,
    bufsize: usize,
    total_size: u64,
}

impl<R: Read> ChunkedReader<R> {
    /// Create a new chunked reader.
    #[must_use]
    pub fn new(source: R, config: &BodyConfig) -> Self {
        Self {
            source: BufReader::new(source),
            state: ChunkedState::Header,
            bufsize: config.bufsize,
            total_size: 0,
        }
    }

    /// Returns true once the terminating zero-size chunk has been read.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == ChunkedState::Complete
    }

    /// Decoded bytes produced so far.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Read one chunk-size line and return the size.
    fn read_header(&mut self) -> Result<usize, BodyError> {
        // The line may hold `bufsize` bytes plus its CRLF.
        let limit = self.bufsize as u64 + 2;
        let mut line = Vec::new();
        (&mut self.source).take(limit).read_until(b'\n', &mut line)?;

        let Some(line) = line.strip_suffix(b"\r\n") else {
            let detail = if line.is_empty() {
                "unexpected end of input in chunk header"
            } else if line.len() as u64 >= limit {
                "chunk header too long"
            } else if line.ends_with(b"\n") {
                "chunk header must end with CRLF"
            } else {
                "unexpected end of input in chunk header"
            };
            return Err(BodyError::MalformedChunkedBody { detail });
        };

        let size = line.split(|&b| b == b';').next().unwrap_or_default();
        parse_hex_size(size)
    }

    /// Read up to one `bufsize` piece of the current chunk.
    fn read_data(&mut self, remaining: usize) -> Result<Vec<u8>, BodyError> {
        let mut chunk = vec![0u8; remaining.min(self.bufsize)];
        self.source.read_exact(&mut chunk).map_err(short_read)?;
        Ok(chunk)
    }

    fn read_data_end(&mut self) -> Result<(), BodyError> {
        let mut crlf = [0u8; 2];
        self.source.read_exact(&mut crlf).map_err(short_read)?;
        if crlf == *b"\r\n" {
            Ok(())
        } else {
            Err(BodyError::MalformedChunkedBody {
                detail: "expected CRLF after chunk data",
            })
        }
    }

    fn step(&mut self) -> Result<Option<Vec<u8>>, BodyError> {
        loop {
            match self.state {
                ChunkedState::Header => {
                    let size = self.read_header()?;
                    self.state = if size == 0 {
                        ChunkedState::Complete
                    } else {
                        ChunkedState::Data { remaining: size }
                    };
                }
                ChunkedState::Data { remaining } => {
                    let chunk = self.read_data(remaining)?;
                    let left = remaining - chunk.len();
                    self.state = if left == 0 {
                        ChunkedState::DataEnd
                    } else {
                        ChunkedState::Data { remaining: left }
                    };
                    self.total_size += chunk.len() as u64;
                    return Ok(Some(chunk));
                }
                ChunkedState::DataEnd => {
                    self.read_data_end()?;
                    self.state = ChunkedState::Header;
                }
                ChunkedState::Complete | ChunkedState::Failed => return Ok(None),
            }
        }
    }
}

impl<R: Read> Iterator for ChunkedReader<R> {
    type Item = Result<Vec<u8>, BodyError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(chunk) => chunk.map(Ok),
            Err(err) => {
                self.state = ChunkedState::Failed;
                Some(Err(err))
            }
        }
    }
}

fn short_read(err: io::Error) -> BodyError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        BodyError::MalformedChunkedBody {
            detail: "unexpected end of input in chunk data",
        }
    } else {
        err.into()
    }
}

fn parse_hex_size(raw: &[u8]) -> Result<usize, BodyError> {
    let digits = raw.trim_ascii();
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(BodyError::MalformedChunkedBody {
            detail: "invalid hex chunk size",
        });
    }
    digits.iter().try_fold(0usize, |acc, &b| {
        let digit = usize::from(hex_digit(b).unwrap_or_default());
        acc.checked_mul(16)
            .and_then(|acc| acc.checked_add(digit))
            .ok_or(BodyError::MalformedChunkedBody {
                detail: "chunk size overflows",
            })
    })
}

// ============================================================================
// Either reader
// ============================================================================

/// The body reader a request uses, picked from its transfer encoding.
#[derive(Debug)]
pub enum BodyChunks<R> {
    /// `Transfer-Encoding: chunked`.
    Chunked(ChunkedReader<R>),
    /// Bounded by `Content-Length`.
    Length(LengthReader<R>),
}

impl<R: Read> BodyChunks<R> {
    /// Pick the chunked decoder when `chunked`, else a length-bounded reader.
    #[must_use]
    pub fn new(source: R, chunked: bool, content_length: u64, config: &BodyConfig) -> Self {
        if chunked {
            Self::Chunked(ChunkedReader::new(source, config))
        } else {
            Self::Length(LengthReader::new(source, content_length, config))
        }
    }
}

impl<R: Read> Iterator for BodyChunks<R> {
    type Item = Result<Vec<u8>, BodyError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Chunked(reader) => reader.next(),
            Self::Length(reader) => reader.next(),
        }
    }
}
