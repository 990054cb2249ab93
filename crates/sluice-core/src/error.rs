//! Error responses.
//!
//! [`HttpError`] is what request processing turns every failure into at the
//! dispatch boundary. Handlers may also return it directly (for example as the
//! `Err` side of a `Result`) to short-circuit with a status and message.

use std::fmt;

use crate::response::{IntoResponse, Response, StatusCode};

/// An error that renders as a plain-text HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    message: Option<String>,
}

impl HttpError {
    /// Error with `status` and the default message.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
        }
    }

    /// Attach a message for the response body.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST).with_message(message)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// The generic 500 Internal Server Error.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Body text: the explicit message, else the reason phrase, else
    /// `Internal Server Error`.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("Internal Server Error")
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message())
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = self.message().to_string();
        Response::with_status(self.status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_message_is_reason_phrase() {
        assert_eq!(HttpError::not_found().message(), "Not Found");
        assert_eq!(HttpError::internal().message(), "Internal Server Error");
        assert_eq!(
            HttpError::new(StatusCode::from_u16(599)).message(),
            "Internal Server Error"
        );
    }

    #[test]
    fn renders_plain_text() {
        let response = HttpError::bad_request("bad chunk").into_response();
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.content_type(), "text/plain; charset=utf-8");
        let gateway = response.into_gateway().unwrap();
        assert_eq!(gateway.status, "400 Bad Request");
        assert_eq!(gateway.body_bytes().unwrap(), b"bad chunk");
    }
}
