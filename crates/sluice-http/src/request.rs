//! The per-request view over a gateway [`Environ`].
//!
//! Every derived field is computed on first access and kept in a
//! [`RequestCache`] slot for the rest of the request. The body is drained
//! from the gateway stream once, spooled into a [`SpooledBody`] and reused by
//! every body-dependent accessor. Failures are cached too, so a malformed
//! body reports the same error to each caller without re-reading.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::io::{self, Seek};

use sluice_core::multipart::MultipartConfig;
use sluice_core::{FileUpload, MultiDict, SpooledBody, parse_cookie_header};

use crate::body::{BodyChunks, BodyConfig, BodyError};
use crate::environ::{Environ, Input, keys};
use crate::form::{FormSource, ParsedForm, parse_form};
use crate::materialize::materialize;
use crate::query::parse_urlencoded;

/// Scheme, host, path and query of the URL the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    /// Host, with a port when it differs from the scheme default.
    pub host: String,
    pub path: String,
    pub query: String,
}

impl fmt::Display for UrlParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

/// One slot per derived field.
#[derive(Default)]
struct RequestCache {
    method: OnceCell<String>,
    path: OnceCell<String>,
    content_type: OnceCell<String>,
    content_length: OnceCell<u64>,
    chunked: OnceCell<bool>,
    query: OnceCell<MultiDict<String>>,
    cookies: OnceCell<MultiDict<String>>,
    url_parts: OnceCell<UrlParts>,
    remote_route: OnceCell<Vec<String>>,
    body: OnceCell<Result<RefCell<SpooledBody>, BodyError>>,
    form: OnceCell<Result<ParsedForm, BodyError>>,
}

/// A request being handled.
///
/// Owned by the worker handling it; not `Sync`.
pub struct Request {
    environ: Environ,
    input: RefCell<Option<Input>>,
    body_config: BodyConfig,
    multipart_config: MultipartConfig,
    cache: RequestCache,
}

impl Request {
    /// Wrap an environment using default limits.
    #[must_use]
    pub fn new(environ: Environ) -> Self {
        Self::with_config(environ, BodyConfig::default(), MultipartConfig::default())
    }

    /// Wrap an environment with explicit body and multipart limits.
    #[must_use]
    pub fn with_config(
        mut environ: Environ,
        body_config: BodyConfig,
        multipart_config: MultipartConfig,
    ) -> Self {
        let input = environ.take_input();
        Self {
            environ,
            input: RefCell::new(Some(input)),
            body_config,
            multipart_config,
            cache: RequestCache::default(),
        }
    }

    // ---------------------------------------------------------------------
    // Request line
    // ---------------------------------------------------------------------

    /// Uppercased request method, `GET` when missing.
    #[must_use]
    pub fn method(&self) -> &str {
        self.cache.method.get_or_init(|| {
            self.environ
                .get(keys::REQUEST_METHOD)
                .unwrap_or("GET")
                .to_ascii_uppercase()
        })
    }

    /// Lowercased path with exactly one leading slash.
    #[must_use]
    pub fn path(&self) -> &str {
        self.cache.path.get_or_init(|| {
            let raw = self.environ.get(keys::PATH_INFO).unwrap_or_default();
            format!("/{}", raw.trim_start_matches('/').to_lowercase())
        })
    }

    /// Raw query string, without the `?`.
    #[must_use]
    pub fn query(&self) -> &str {
        self.environ.get(keys::QUERY_STRING).unwrap_or_default()
    }

    /// Decoded query parameters.
    #[must_use]
    pub fn query_params(&self) -> &MultiDict<String> {
        self.cache
            .query
            .get_or_init(|| parse_urlencoded(self.query()))
    }

    /// Path plus query string.
    #[must_use]
    pub fn url(&self) -> String {
        let query = self.query();
        if query.is_empty() {
            self.path().to_string()
        } else {
            format!("{}?{query}", self.path())
        }
    }

    /// URL components as the client saw them, honouring proxy headers.
    #[must_use]
    pub fn url_parts(&self) -> &UrlParts {
        self.cache.url_parts.get_or_init(|| {
            let scheme = self
                .environ
                .get(keys::HTTP_X_FORWARDED_PROTO)
                .or_else(|| self.environ.get(keys::URL_SCHEME))
                .unwrap_or("http")
                .to_ascii_lowercase();
            let host = self
                .environ
                .get(keys::HTTP_X_FORWARDED_HOST)
                .or_else(|| self.environ.get(keys::HTTP_HOST))
                .map_or_else(|| self.server_host(&scheme), str::to_string)
                .to_ascii_lowercase();
            UrlParts {
                scheme,
                host,
                path: self.path().to_string(),
                query: self.query().to_string(),
            }
        })
    }

    /// Absolute URL.
    #[must_use]
    pub fn url_full(&self) -> String {
        self.url_parts().to_string()
    }

    fn server_host(&self, scheme: &str) -> String {
        let name = self.environ.get(keys::SERVER_NAME).unwrap_or("127.0.0.1");
        let port = self.environ.get(keys::SERVER_PORT).unwrap_or("80");
        let default_port = if scheme == "https" { "443" } else { "80" };
        if port == default_port {
            name.to_string()
        } else {
            format!("{name}:{port}")
        }
    }

    // ---------------------------------------------------------------------
    // Headers
    // ---------------------------------------------------------------------

    /// Lowercased `Content-Type`, empty when missing.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.cache.content_type.get_or_init(|| {
            self.environ
                .get(keys::CONTENT_TYPE)
                .unwrap_or_default()
                .to_ascii_lowercase()
        })
    }

    /// Declared `Content-Length`; 0 when missing or not a number.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        *self.cache.content_length.get_or_init(|| {
            self.environ
                .get(keys::CONTENT_LENGTH)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        })
    }

    /// Returns true if the body uses chunked transfer encoding.
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        *self.cache.chunked.get_or_init(|| {
            self.environ
                .get(keys::HTTP_TRANSFER_ENCODING)
                .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
        })
    }

    /// Returns true for `X-Requested-With: XMLHttpRequest`.
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        self.environ
            .get(keys::HTTP_X_REQUESTED_WITH)
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    /// Cookies sent by the client.
    #[must_use]
    pub fn cookies(&self) -> &MultiDict<String> {
        self.cache.cookies.get_or_init(|| {
            parse_cookie_header(self.environ.get(keys::HTTP_COOKIE).unwrap_or_default())
        })
    }

    /// Client addresses: the `X-Forwarded-For` chain, else `REMOTE_ADDR`.
    #[must_use]
    pub fn remote_route(&self) -> &[String] {
        self.cache.remote_route.get_or_init(|| {
            if let Some(chain) = self.environ.get(keys::HTTP_X_FORWARDED_FOR) {
                return chain
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            self.environ
                .get(keys::REMOTE_ADDR)
                .map(|addr| vec![addr.to_string()])
                .unwrap_or_default()
        })
    }

    /// The first address of [`Request::remote_route`].
    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_route().first().map(String::as_str)
    }

    /// Raw environment variable.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environ.get(key)
    }

    /// Environment variable names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.environ.keys()
    }

    /// The wrapped environment.
    #[must_use]
    pub fn environ(&self) -> &Environ {
        &self.environ
    }

    // ---------------------------------------------------------------------
    // Body
    // ---------------------------------------------------------------------

    /// Run `f` over the materialized body, positioned at the start.
    ///
    /// The first call drains the gateway stream. The body is rewound
    /// afterwards, so `f` may read freely.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from inside `f`.
    pub fn with_body<T>(&self, f: impl FnOnce(&mut SpooledBody) -> T) -> Result<T, BodyError> {
        let cell = self.body()?;
        let mut body = cell.borrow_mut();
        body.rewind()?;
        let out = f(&mut body);
        body.rewind()?;
        Ok(out)
    }

    /// The whole body as bytes.
    pub fn body_bytes(&self) -> Result<Vec<u8>, BodyError> {
        Ok(self.with_body(SpooledBody::contents)??)
    }

    /// Text form fields (url-encoded or multipart).
    pub fn form(&self) -> Result<&MultiDict<String>, BodyError> {
        self.parsed_form().map(|form| &form.fields)
    }

    /// Uploaded files from a multipart body.
    pub fn files(&self) -> Result<&MultiDict<FileUpload>, BodyError> {
        self.parsed_form().map(|form| &form.files)
    }

    fn body(&self) -> Result<&RefCell<SpooledBody>, BodyError> {
        self.cache
            .body
            .get_or_init(|| self.read_body().map(RefCell::new))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn read_body(&self) -> Result<SpooledBody, BodyError> {
        let input = self
            .input
            .borrow_mut()
            .take()
            .unwrap_or_else(|| Box::new(io::empty()));
        let chunks = BodyChunks::new(
            input,
            self.is_chunked(),
            self.content_length(),
            &self.body_config,
        );
        materialize(chunks, self.body_config.memfile_max())
    }

    fn parsed_form(&self) -> Result<&ParsedForm, BodyError> {
        self.cache
            .form
            .get_or_init(|| {
                let cell = self.body()?;
                let source = FormSource {
                    content_type: self.environ.get(keys::CONTENT_TYPE).unwrap_or_default(),
                    content_length: self.content_length(),
                    chunked: self.is_chunked(),
                    memfile_max: self.body_config.memfile_max(),
                };
                parse_form(source, &mut cell.borrow_mut(), &self.multipart_config)
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method())
            .field("path", &self.path())
            .field("query", &self.query())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn get(path: &str) -> Environ {
        Environ::new()
            .with(keys::REQUEST_METHOD, "get")
            .with(keys::PATH_INFO, path)
    }

    fn post(content_type: &str, body: &[u8]) -> Environ {
        Environ::new()
            .with(keys::REQUEST_METHOD, "POST")
            .with(keys::PATH_INFO, "/submit")
            .with(keys::CONTENT_TYPE, content_type)
            .with(keys::CONTENT_LENGTH, body.len().to_string())
            .with_input(Cursor::new(body.to_vec()))
    }

    // =========================================================================
    // Request line
    // =========================================================================

    #[test]
    fn method_and_path_are_normalized() {
        let req = Request::new(get("//Users/Alice"));
        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/users/alice");

        let req = Request::new(Environ::new());
        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/");
    }

    #[test]
    fn query_is_parsed_once() {
        let req = Request::new(get("/search").with(keys::QUERY_STRING, "q=rust&tag=a&tag=b"));
        assert_eq!(req.query(), "q=rust&tag=a&tag=b");
        assert_eq!(req.url(), "/search?q=rust&tag=a&tag=b");
        let first = req.query_params();
        assert_eq!(first.getlist("tag").unwrap(), ["a", "b"]);
        assert!(std::ptr::eq(first, req.query_params()));
    }

    #[test]
    fn url_parts_prefer_forwarded_headers() {
        let env = get("/x")
            .with(keys::URL_SCHEME, "http")
            .with_header("Host", "internal:8080")
            .with_header("X-Forwarded-Proto", "HTTPS")
            .with_header("X-Forwarded-Host", "Example.COM");
        let req = Request::new(env);
        assert_eq!(req.url_parts().scheme, "https");
        assert_eq!(req.url_parts().host, "example.com");
        assert_eq!(req.url_full(), "https://example.com/x");
    }

    #[test]
    fn url_parts_fall_back_to_server_name() {
        let env = get("/x")
            .with(keys::SERVER_NAME, "localhost")
            .with(keys::SERVER_PORT, "8080")
            .with(keys::QUERY_STRING, "a=1");
        assert_eq!(Request::new(env).url_full(), "http://localhost:8080/x?a=1");

        let env = get("/")
            .with(keys::URL_SCHEME, "https")
            .with(keys::SERVER_NAME, "secure")
            .with(keys::SERVER_PORT, "443");
        assert_eq!(Request::new(env).url_full(), "https://secure/");

        assert_eq!(Request::new(get("/")).url_parts().host, "127.0.0.1");
    }

    // =========================================================================
    // Headers
    // =========================================================================

    #[test]
    fn header_accessors() {
        let env = get("/")
            .with(keys::CONTENT_TYPE, "Application/JSON")
            .with(keys::CONTENT_LENGTH, "nope")
            .with_header("Transfer-Encoding", "gzip, Chunked")
            .with_header("X-Requested-With", "XMLHttpRequest")
            .with_header("Cookie", "sid=abc; theme=\"dark\"");
        let req = Request::new(env);
        assert_eq!(req.content_type(), "application/json");
        assert_eq!(req.content_length(), 0);
        assert!(req.is_chunked());
        assert!(req.is_ajax());
        assert_eq!(req.cookies().get("sid").map(String::as_str), Some("abc"));
        assert_eq!(req.cookies().get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn remote_route_uses_forwarded_for() {
        let env = get("/")
            .with(keys::REMOTE_ADDR, "10.0.0.1")
            .with_header("X-Forwarded-For", "1.2.3.4, 5.6.7.8");
        let req = Request::new(env);
        assert_eq!(req.remote_route(), ["1.2.3.4", "5.6.7.8"]);
        assert_eq!(req.remote_addr(), Some("1.2.3.4"));

        let req = Request::new(get("/").with(keys::REMOTE_ADDR, "10.0.0.1"));
        assert_eq!(req.remote_addr(), Some("10.0.0.1"));
        assert_eq!(Request::new(get("/")).remote_addr(), None);
    }

    // =========================================================================
    // Body
    // =========================================================================

    #[test]
    fn urlencoded_form() {
        let req = Request::new(post("application/x-www-form-urlencoded", b"a=1&a=2&b="));
        let form = req.form().unwrap();
        assert_eq!(form.getlist("a").unwrap(), ["1", "2"]);
        assert_eq!(form.getlist("b").unwrap(), [""]);
        assert!(req.files().unwrap().is_empty());
        // Body is still readable after the form was parsed.
        assert_eq!(req.body_bytes().unwrap(), b"a=1&a=2&b=");
    }

    #[test]
    fn chunked_body_is_decoded() {
        let env = get("/")
            .with_header("Transfer-Encoding", "chunked")
            .with_input(Cursor::new(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n".to_vec()));
        let req = Request::new(env);
        assert_eq!(req.body_bytes().unwrap(), b"Wikipedia");
        assert_eq!(req.body_bytes().unwrap(), b"Wikipedia");
    }

    #[test]
    fn malformed_chunked_body_error_is_cached() {
        let env = get("/")
            .with_header("Transfer-Encoding", "chunked")
            .with_input(Cursor::new(b"zz\r\n".to_vec()));
        let req = Request::new(env);
        let first = req.body_bytes().unwrap_err();
        assert!(matches!(first, BodyError::MalformedChunkedBody { .. }));
        assert_eq!(req.form().unwrap_err(), first);
    }

    #[test]
    fn oversized_urlencoded_body() {
        let body = vec![b'a'; 64];
        let req = Request::with_config(
            post("application/x-www-form-urlencoded", &body),
            BodyConfig::new().with_memfile_max(32),
            MultipartConfig::default(),
        );
        assert_eq!(
            req.form().unwrap_err(),
            BodyError::PayloadTooLarge { size: 64, max: 32 }
        );
        // The raw body is still available.
        assert_eq!(req.body_bytes().unwrap().len(), 64);
    }

    #[test]
    fn large_body_spills_to_disk() {
        let body = vec![b'x'; 300];
        let req = Request::with_config(
            post("text/plain", &body),
            BodyConfig::new().with_memfile_max(100).with_bufsize(64),
            MultipartConfig::default(),
        );
        let spooled = req.with_body(|b| b.is_spooled()).unwrap();
        assert!(spooled);
        assert_eq!(req.body_bytes().unwrap(), body);
    }

    #[test]
    fn with_body_starts_at_zero() {
        let req = Request::new(post("text/plain", b"hello"));
        let mut first = String::new();
        req.with_body(|b| b.read_to_string(&mut first)).unwrap().unwrap();
        let mut second = String::new();
        req.with_body(|b| b.read_to_string(&mut second)).unwrap().unwrap();
        assert_eq!(first, "hello");
        assert_eq!(second, "hello");
    }

    #[test]
    fn multipart_form_and_files() {
        let body = concat!(
            "--b\r\n",
            "Content-Disposition: form-data; name=\"note\"\r\n\r\n",
            "hi\r\n",
            "--b\r\n",
            "Content-Disposition: form-data; name=\"doc\"; filename=\"../../etc/My File.TXT\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "contents\r\n",
            "--b--\r\n",
        );
        let req = Request::new(post("multipart/form-data; boundary=b", body.as_bytes()));
        assert_eq!(req.form().unwrap().get("note").map(String::as_str), Some("hi"));
        let doc = req.files().unwrap().get("doc").unwrap();
        assert_eq!(doc.filename(), "my-file.txt");
        assert_eq!(doc.read_to_vec().unwrap(), b"contents");
    }

    #[test]
    fn multipart_boundary_keeps_its_case() {
        let body = concat!(
            "------WebKitFormBoundary7MA4YWxkTrZu0gW\r\n",
            "Content-Disposition: form-data; name=\"note\"\r\n\r\n",
            "hi\r\n",
            "------WebKitFormBoundary7MA4YWxkTrZu0gW--\r\n",
        );
        let req = Request::new(post(
            "multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW",
            body.as_bytes(),
        ));
        assert_eq!(req.form().unwrap().get("note").map(String::as_str), Some("hi"));
        assert!(req.files().unwrap().is_empty());
    }
}
