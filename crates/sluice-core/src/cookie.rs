//! Cookie header parsing and `Set-Cookie` rendering.

use std::fmt;

use crate::multidict::MultiDict;

/// Expiry date sent when deleting a cookie.
pub const EPOCH_EXPIRES: &str = "Thu, 01-Jan-1970 00:00:00 GMT";

/// Parse a `Cookie` request header into name/value pairs.
///
/// Pairs without `=` are ignored. Double-quoted values are unquoted.
/// Repeated names keep every value in order.
#[must_use]
pub fn parse_cookie_header(header: &str) -> MultiDict<String> {
    let mut cookies = MultiDict::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        cookies.append(name, unquote_value(value.trim()));
    }
    cookies
}

fn unquote_value(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn is_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~:".contains(ch)
}

/// One `Set-Cookie` header value.
///
/// Attributes render in a fixed order: `Domain`, `expires`, `HttpOnly`,
/// `Max-Age`, `Path`, `Secure`, `SameSite`. The path defaults to `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    domain: Option<String>,
    expires: Option<String>,
    http_only: bool,
    max_age: Option<i64>,
    path: Option<String>,
    secure: bool,
    same_site: Option<String>,
}

impl SetCookie {
    /// A cookie with the default path `/`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            expires: None,
            http_only: false,
            max_age: None,
            path: Some("/".to_string()),
            secure: false,
            same_site: None,
        }
    }

    /// A cookie that tells the client to drop `name`: empty value,
    /// `Max-Age=0` and an expiry at the epoch.
    #[must_use]
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0).expires(EPOCH_EXPIRES)
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the `expires` attribute to a preformatted HTTP date.
    #[must_use]
    pub fn expires(mut self, date: impl Into<String>) -> Self {
        self.expires = Some(date.into());
        self
    }

    #[must_use]
    pub fn http_only(mut self, on: bool) -> Self {
        self.http_only = on;
        self
    }

    #[must_use]
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Set the path; an empty string removes the attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.is_empty() { None } else { Some(path) };
        self
    }

    #[must_use]
    pub fn secure(mut self, on: bool) -> Self {
        self.secure = on;
        self
    }

    /// Set `SameSite` (`Strict`, `Lax` or `None`).
    #[must_use]
    pub fn same_site(mut self, policy: impl Into<String>) -> Self {
        self.same_site = Some(policy.into());
        self
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value, unquoted.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        f.write_str("=")?;
        if !self.value.is_empty() && self.value.chars().all(is_token_char) {
            f.write_str(&self.value)?;
        } else {
            f.write_str("\"")?;
            for ch in self.value.chars() {
                if matches!(ch, '"' | '\\') {
                    f.write_str("\\")?;
                }
                write!(f, "{ch}")?;
            }
            f.write_str("\"")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(expires) = &self.expires {
            write!(f, "; expires={expires}")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if let Some(same_site) = &self.same_site {
            write!(f, "; SameSite={same_site}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_header_pairs() {
        let cookies = parse_cookie_header("a=1; b=\"quoted \\\"x\\\"\"; junk; c=; a=2");
        assert_eq!(cookies.getlist("a").unwrap(), ["1", "2"]);
        assert_eq!(cookies.get("b").map(String::as_str), Some("quoted \"x\""));
        assert_eq!(cookies.get("c").map(String::as_str), Some(""));
        assert!(!cookies.contains_key("junk"));
    }

    #[test]
    fn render_attribute_order() {
        let cookie = SetCookie::new("id", "42")
            .secure(true)
            .path("/app")
            .max_age(60)
            .http_only(true)
            .domain("example.com");
        assert_eq!(
            cookie.to_string(),
            "id=42; Domain=example.com; HttpOnly; Max-Age=60; Path=/app; Secure"
        );
    }

    #[test]
    fn render_quotes_special_values() {
        assert_eq!(
            SetCookie::new("msg", "hello world").path("").to_string(),
            "msg=\"hello world\""
        );
    }

    #[test]
    fn removal_expires_immediately() {
        assert_eq!(
            SetCookie::removal("sid").to_string(),
            "sid=\"\"; expires=Thu, 01-Jan-1970 00:00:00 GMT; Max-Age=0; Path=/"
        );
    }
}
