//! HTTP responses and conversion from handler return values.
//!
//! A [`Response`] holds a status, an ordered header list, `Set-Cookie`
//! entries and a [`ResponseBody`]. Handlers may return anything implementing
//! [`IntoResponse`]; the dispatch loop turns it into a [`GatewayResponse`]
//! with a status line and a final header list.

use std::fmt;
use std::io;

use serde::Serialize;

use crate::cookie::SetCookie;

/// Content type used when a response does not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const CONTINUE: Self = Self(100);
    pub const OK: Self = Self(200);
    pub const CREATED: Self = Self(201);
    pub const NO_CONTENT: Self = Self(204);
    pub const MOVED_PERMANENTLY: Self = Self(301);
    pub const FOUND: Self = Self(302);
    pub const SEE_OTHER: Self = Self(303);
    pub const NOT_MODIFIED: Self = Self(304);
    pub const BAD_REQUEST: Self = Self(400);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const FORBIDDEN: Self = Self(403);
    pub const NOT_FOUND: Self = Self(404);
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    /// Wrap a raw code. Unknown codes are accepted here and rejected when the
    /// status line is rendered.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    /// The numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Registered reason phrase, if the code is known.
    #[must_use]
    pub fn canonical_reason(self) -> Option<&'static str> {
        Some(match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            102 => "Processing",
            103 => "Early Hints",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            203 => "Non-Authoritative Information",
            204 => "No Content",
            205 => "Reset Content",
            206 => "Partial Content",
            207 => "Multi-Status",
            208 => "Already Reported",
            226 => "IM Used",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            305 => "Use Proxy",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            402 => "Payment Required",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            409 => "Conflict",
            410 => "Gone",
            411 => "Length Required",
            412 => "Precondition Failed",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            416 => "Range Not Satisfiable",
            417 => "Expectation Failed",
            418 => "I'm a teapot",
            421 => "Misdirected Request",
            422 => "Unprocessable Entity",
            423 => "Locked",
            424 => "Failed Dependency",
            425 => "Too Early",
            426 => "Upgrade Required",
            428 => "Precondition Required",
            429 => "Too Many Requests",
            431 => "Request Header Fields Too Large",
            451 => "Unavailable For Legal Reasons",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            506 => "Variant Also Negotiates",
            507 => "Insufficient Storage",
            508 => "Loop Detected",
            510 => "Not Extended",
            511 => "Network Authentication Required",
            _ => return None,
        })
    }

    /// `"<code> <reason>"`, failing for codes without a registered phrase.
    pub fn status_line(self) -> Result<String, UnknownStatus> {
        self.canonical_reason()
            .map(|reason| format!("{} {reason}", self.0))
            .ok_or(UnknownStatus(self.0))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_reason() {
            Some(reason) => write!(f, "{} {reason}", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A status code with no registered reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownStatus(pub u16);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown HTTP status code {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// Lazy producer of body chunks.
pub type BodyStream = Box<dyn Iterator<Item = io::Result<Vec<u8>>> + Send>;

/// Response payload.
pub enum ResponseBody {
    /// Fully materialized chunks; `Content-Length` is computed from them.
    Chunks(Vec<Vec<u8>>),
    /// Lazily produced chunks of unknown total length.
    Stream(BodyStream),
}

impl ResponseBody {
    /// An empty materialized body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Chunks(Vec::new())
    }

    /// Total byte length, if known ahead of time.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Chunks(chunks) => Some(chunks.iter().map(Vec::len).sum()),
            Self::Stream(_) => None,
        }
    }

    /// Returns true for a materialized body with no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunks(chunks) => f.debug_tuple("Chunks").field(&chunks.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            Self::empty()
        } else {
            Self::Chunks(vec![bytes])
        }
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        text.into_bytes().into()
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        text.as_bytes().to_vec().into()
    }
}

/// What the gateway receives: status line, final headers and the body.
#[derive(Debug)]
pub struct GatewayResponse {
    /// `"<code> <reason>"`.
    pub status: String,
    /// Headers in emission order, `Set-Cookie` entries last.
    pub headers: Vec<(String, String)>,
    /// Body chunks or a lazy producer.
    pub body: ResponseBody,
}

impl GatewayResponse {
    /// Drain the body into one buffer.
    pub fn body_bytes(self) -> io::Result<Vec<u8>> {
        match self.body {
            ResponseBody::Chunks(chunks) => Ok(chunks.concat()),
            ResponseBody::Stream(stream) => {
                let mut out = Vec::new();
                for chunk in stream {
                    out.extend_from_slice(&chunk?);
                }
                Ok(out)
            }
        }
    }

    /// First header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response under construction.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    cookies: Vec<SetCookie>,
    body: ResponseBody,
}

impl Default for Response {
    fn default() -> Self {
        Self::with_status(StatusCode::OK)
    }
}

impl Response {
    /// 200 OK with an empty body.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Empty response with `status`.
    #[must_use]
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: ResponseBody::empty(),
        }
    }

    /// `404 Not Found` with a plain-text body.
    #[must_use]
    pub fn not_found(text: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(text.into())
    }

    /// Redirect to `location`.
    ///
    /// Only 301 is kept as given; every other code becomes 302 Found.
    #[must_use]
    pub fn redirect(location: impl Into<String>, code: u16) -> Self {
        let status = if code == 301 {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        };
        Self::with_status(status).header("Location", location)
    }

    /// Serialize `value` as an `application/json` body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::ok()
            .header("Content-Type", "application/json")
            .body(body))
    }

    /// Replace the status.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any previous value under the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Use a lazy chunk producer as the body.
    #[must_use]
    pub fn stream<I>(mut self, chunks: I) -> Self
    where
        I: Iterator<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        self.body = ResponseBody::Stream(Box::new(chunks));
        self
    }

    /// Set a header in place, replacing any previous value under the same name.
    ///
    /// Names are compared case-insensitively; the new spelling is kept.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Add a header without removing existing ones.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Attach a `Set-Cookie` entry.
    pub fn set_cookie(&mut self, cookie: SetCookie) {
        self.cookies.retain(|existing| existing.name() != cookie.name());
        self.cookies.push(cookie);
    }

    /// Instruct the client to drop the cookie `name`.
    ///
    /// `path` and `domain` must match the values used when it was set.
    pub fn delete_cookie(&mut self, name: &str, path: Option<&str>, domain: Option<&str>) {
        let mut cookie = SetCookie::removal(name);
        if let Some(path) = path {
            cookie = cookie.path(path);
        }
        if let Some(domain) = domain {
            cookie = cookie.domain(domain);
        }
        self.set_cookie(cookie);
    }

    /// Status code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Headers explicitly set, in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Pending `Set-Cookie` entries.
    #[must_use]
    pub fn cookies(&self) -> &[SetCookie] {
        &self.cookies
    }

    /// Drop every pending cookie.
    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    /// Body.
    #[must_use]
    pub fn body_ref(&self) -> &ResponseBody {
        &self.body
    }

    /// Effective content type, falling back to [`DEFAULT_CONTENT_TYPE`].
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.get_header("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// `charset` parameter of the content type, defaulting to `UTF-8`.
    #[must_use]
    pub fn charset(&self) -> String {
        self.content_type()
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .map_or_else(
                || "UTF-8".to_string(),
                |(_, value)| value.trim().trim_matches('"').to_string(),
            )
    }

    /// Final header list: explicit headers, a default `Content-Type`, a
    /// computed `Content-Length` for materialized bodies, then `Set-Cookie`.
    #[must_use]
    pub fn header_list(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if self.get_header("Content-Type").is_none() {
            headers.push(("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string()));
        }
        if let Some(len) = self.body.len() {
            headers.retain(|(key, _)| !key.eq_ignore_ascii_case("Content-Length"));
            headers.push(("Content-Length".to_string(), len.to_string()));
        }
        headers.extend(
            self.cookies
                .iter()
                .map(|cookie| ("Set-Cookie".to_string(), cookie.to_string())),
        );
        headers
    }

    /// Convert into what the gateway expects.
    pub fn into_gateway(self) -> Result<GatewayResponse, UnknownStatus> {
        let status = self.status.status_line()?;
        let headers = self.header_list();
        Ok(GatewayResponse {
            status,
            headers,
            body: self.body,
        })
    }
}

impl fmt::Display for Response {
    /// Human-readable dump: status line, headers, blank line, body.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.status)?;
        for (name, value) in self.header_list() {
            writeln!(f, "{name}: {value}")?;
        }
        writeln!(f)?;
        match &self.body {
            ResponseBody::Chunks(chunks) => {
                let bytes = chunks.concat();
                if self.charset().eq_ignore_ascii_case("utf-8") {
                    f.write_str(&String::from_utf8_lossy(&bytes))
                } else {
                    write!(f, "<{} bytes>", bytes.len())
                }
            }
            ResponseBody::Stream(_) => f.write_str("<stream>"),
        }
    }
}

/// Conversion from handler return values into a [`Response`].
pub trait IntoResponse {
    /// Build the response.
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::ok()
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        Response::ok().body(self)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        Response::ok().body(self)
    }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> Response {
        Response::ok().body(self)
    }
}

impl IntoResponse for Vec<Vec<u8>> {
    fn into_response(self) -> Response {
        Response::ok().body(ResponseBody::Chunks(self))
    }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        self.1.into_response().status(self.0)
    }
}

impl<T: IntoResponse> IntoResponse for Option<T> {
    /// `None` becomes an empty 200 response.
    fn into_response(self) -> Response {
        self.map_or_else(Response::ok, IntoResponse::into_response)
    }
}

impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(err) => err.into_response(),
        }
    }
}

/// JSON body wrapper.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match Response::json(&self.0) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize JSON response");
                crate::error::HttpError::internal().into_response()
            }
        }
    }
}
