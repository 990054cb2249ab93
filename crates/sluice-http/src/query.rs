//! URL-encoded data parsing.
//!
//! The same `application/x-www-form-urlencoded` rules apply to query strings
//! and to url-encoded request bodies:
//! - pairs are separated by `&`; empty segments are skipped
//! - a segment without `=` is a key with an empty value
//! - keys and values are percent-decoded, with `+` meaning space
//! - blank values and repeated keys are kept, in order
//!
//! # Example
//!
//! ```
//! use sluice_http::query::parse_urlencoded;
//!
//! let form = parse_urlencoded("a=1&a=2&b=");
//! assert_eq!(form.getlist("a").unwrap(), ["1", "2"]);
//! assert_eq!(form.getlist("b").unwrap(), [""]);
//! ```

use std::borrow::Cow;

use sluice_core::MultiDict;

/// Parse url-encoded text into an ordered multi-valued map.
#[must_use]
pub fn parse_urlencoded(raw: &str) -> MultiDict<String> {
    raw.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            (percent_decode(key).into_owned(), percent_decode(value).into_owned())
        })
        .collect()
}

/// Percent-decode a string.
///
/// Returns a `Cow::Borrowed` if no decoding was needed,
/// or `Cow::Owned` if percent sequences or `+` were decoded.
/// Invalid escapes are kept as-is; decoded bytes that are not UTF-8 are
/// replaced with U+FFFD.
///
/// ```
/// use sluice_http::query::percent_decode;
///
/// assert!(matches!(percent_decode("hello"), std::borrow::Cow::Borrowed(_)));
/// assert_eq!(percent_decode("hello%20world+again"), "hello world again");
/// assert_eq!(percent_decode("100%"), "100%");
/// ```
#[must_use]
pub fn percent_decode(s: &str) -> Cow<'_, str> {
    if !s.contains(['%', '+']) {
        return Cow::Borrowed(s);
    }

    let bytes = s.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let pair = bytes.get(i + 1).copied().zip(bytes.get(i + 2).copied());
                match pair.and_then(|(hi, lo)| Some(hex_digit(hi)? << 4 | hex_digit(lo)?)) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                result.push(b' ');
                i += 1;
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }

    Cow::Owned(match String::from_utf8(result) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

/// Convert a hex digit to its numeric value.
pub(crate) fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
