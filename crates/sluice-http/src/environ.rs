//! The gateway environment.
//!
//! An [`Environ`] is what a server hands the application for one request:
//! CGI-style string variables (`REQUEST_METHOD`, `PATH_INFO`, `HTTP_HOST`, ...)
//! plus the raw body stream. Header fields use the CGI convention of an
//! `HTTP_` prefix with dashes turned into underscores, except for
//! `CONTENT_TYPE` and `CONTENT_LENGTH`.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

/// Well-known variable names.
pub mod keys {
    pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
    pub const PATH_INFO: &str = "PATH_INFO";
    pub const QUERY_STRING: &str = "QUERY_STRING";
    pub const CONTENT_TYPE: &str = "CONTENT_TYPE";
    pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";
    pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
    pub const SERVER_NAME: &str = "SERVER_NAME";
    pub const SERVER_PORT: &str = "SERVER_PORT";
    /// `http` or `https`, as seen by the server.
    pub const URL_SCHEME: &str = "URL_SCHEME";
    pub const HTTP_HOST: &str = "HTTP_HOST";
    pub const HTTP_COOKIE: &str = "HTTP_COOKIE";
    pub const HTTP_TRANSFER_ENCODING: &str = "HTTP_TRANSFER_ENCODING";
    pub const HTTP_X_FORWARDED_FOR: &str = "HTTP_X_FORWARDED_FOR";
    pub const HTTP_X_FORWARDED_HOST: &str = "HTTP_X_FORWARDED_HOST";
    pub const HTTP_X_FORWARDED_PROTO: &str = "HTTP_X_FORWARDED_PROTO";
    pub const HTTP_X_REQUESTED_WITH: &str = "HTTP_X_REQUESTED_WITH";
}

/// Boxed body stream supplied by the server.
pub type Input = Box<dyn Read + Send>;

/// Variables and body stream for one request.
#[derive(Default)]
pub struct Environ {
    vars: HashMap<String, String>,
    input: Option<Input>,
}

impl Environ {
    /// An empty environment with no body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment from a request line and header list.
    ///
    /// `target` is split into `PATH_INFO` (percent-decoded) and
    /// `QUERY_STRING` (kept raw). Repeated headers are joined with `", "`.
    #[must_use]
    pub fn from_request_parts<I, K, V>(method: &str, target: &str, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let mut env = Self::new()
            .with(keys::REQUEST_METHOD, method)
            .with(keys::PATH_INFO, decode_path(path))
            .with(keys::QUERY_STRING, query);
        for (name, value) in headers {
            let key = header_key(name.as_ref());
            let value = value.as_ref().trim();
            match env.vars.get_mut(&key) {
                Some(existing) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                None => {
                    env.vars.insert(key, value.to_string());
                }
            }
        }
        env
    }

    /// Set a variable.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a header using its HTTP name (`X-Forwarded-For` -> `HTTP_X_FORWARDED_FOR`).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(header_key(name), value);
        self
    }

    /// Attach the body stream.
    #[must_use]
    pub fn with_input<R: Read + Send + 'static>(mut self, input: R) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    /// Set a variable in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Variable value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Header value by HTTP name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.get(&header_key(name))
    }

    /// Variable names, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Returns true if a body stream is attached.
    #[must_use]
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Detach the body stream; a missing stream reads as empty.
    pub fn take_input(&mut self) -> Input {
        self.input.take().unwrap_or_else(|| Box::new(io::empty()))
    }
}

impl fmt::Debug for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environ")
            .field("vars", &self.vars)
            .field("input", &self.input.as_ref().map(|_| ".."))
            .finish()
    }
}

/// CGI variable name for an HTTP header.
#[must_use]
pub fn header_key(name: &str) -> String {
    let upper = name.trim().to_ascii_uppercase().replace('-', "_");
    match upper.as_str() {
        keys::CONTENT_TYPE | keys::CONTENT_LENGTH => upper,
        _ => format!("HTTP_{upper}"),
    }
}

/// Percent-decode a path. Unlike form data, `+` stays literal.
fn decode_path(path: &str) -> String {
    if !path.contains('%') {
        return path.to_string();
    }
    let escaped = path.replace('+', "%2B");
    crate::query::percent_decode(&escaped).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_keys_follow_cgi_convention() {
        assert_eq!(header_key("Host"), "HTTP_HOST");
        assert_eq!(header_key("x-forwarded-for"), "HTTP_X_FORWARDED_FOR");
        assert_eq!(header_key("Content-Type"), "CONTENT_TYPE");
        assert_eq!(header_key("content-length"), "CONTENT_LENGTH");
    }

    #[test]
    fn from_request_parts_splits_target() {
        let env = Environ::from_request_parts(
            "post",
            "/a%20b/c+d?x=1&y=%20",
            [("Content-Type", "text/plain"), ("Accept", "a"), ("accept", "b")],
        );
        assert_eq!(env.get(keys::REQUEST_METHOD), Some("post"));
        assert_eq!(env.get(keys::PATH_INFO), Some("/a b/c+d"));
        assert_eq!(env.get(keys::QUERY_STRING), Some("x=1&y=%20"));
        assert_eq!(env.get(keys::CONTENT_TYPE), Some("text/plain"));
        assert_eq!(env.header("Accept"), Some("a, b"));
    }

    #[test]
    fn missing_input_reads_empty() {
        let mut env = Environ::new();
        assert!(!env.has_input());
        let mut out = Vec::new();
        env.take_input().read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn debug_hides_input() {
        let env = Environ::new().with_input(io::empty());
        assert!(format!("{env:?}").contains("input: Some(\"..\")"));
    }
}
