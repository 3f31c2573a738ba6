//! Content-Type validation and boundary extraction for bundle envelopes.
//!
//! A bundle is announced by `Content-Type: multipart/related; boundary=<token>`.
//! Validation follows a fixed precedence so that clients always receive the
//! same diagnostic for the same header:
//!
//! 1. header present
//! 2. header non-empty
//! 3. parameter section present
//! 4. `boundary` parameter present and non-empty
//! 5. media type is `multipart/related`

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::BoundaryError;

/// Media type that marks a request or response as a bundle.
pub const BUNDLE_MEDIA_TYPE: &str = "multipart/related";

/// RFC 2046 caps boundaries at 70 characters.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Length of the random suffix in generated boundaries.
const GENERATED_BOUNDARY_LEN: usize = 32;

/// Punctuation RFC 2046 allows in a boundary besides digits, letters and space.
const BOUNDARY_PUNCTUATION: &[char] = &[
    '\'', '(', ')', '+', '_', ',', '-', '.', '/', ':', '=', '?',
];

/// Characters that force a boundary to be quoted in a header parameter.
const TSPECIALS: &[char] = &[
    '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '=', ' ',
];

/// Delimiter token separating the parts of a multipart body.
///
/// The token is used verbatim on both the split and the assemble path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundaryToken(String);

impl BoundaryToken {
    /// Create a token from RFC 2046 boundary characters.
    ///
    /// Rejects empty or over-long values, characters outside the boundary
    /// alphabet, and a trailing space.
    pub fn new<S: Into<String>>(token: S) -> Result<Self, BoundaryError> {
        let token = token.into();
        if token.is_empty() || token.len() > MAX_BOUNDARY_LEN {
            return Err(BoundaryError::BoundaryNotSet);
        }
        if !token.chars().all(is_boundary_char) || token.ends_with(' ') {
            return Err(BoundaryError::BoundaryNotSet);
        }
        Ok(Self(token))
    }

    /// Draw a fresh random token.
    pub fn generate() -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_BOUNDARY_LEN)
            .map(char::from)
            .collect();
        Self(format!("bundle_{suffix}"))
    }

    /// The token as written in the header.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dash-prefixed delimiter as it appears in the body (`--<token>`).
    pub fn delimiter(&self) -> Vec<u8> {
        let mut delimiter = Vec::with_capacity(self.0.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(self.0.as_bytes());
        delimiter
    }

    /// Full `Content-Type` value announcing a bundle framed by this token.
    pub fn content_type(&self) -> String {
        if self.0.contains(TSPECIALS) {
            format!("{BUNDLE_MEDIA_TYPE}; boundary=\"{}\"", self.0)
        } else {
            format!("{BUNDLE_MEDIA_TYPE}; boundary={}", self.0)
        }
    }
}

impl std::fmt::Display for BoundaryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the boundary from a `Content-Type` header value.
///
/// `None` means the header is absent.
pub fn extract_boundary(content_type: Option<&str>) -> Result<BoundaryToken, BoundaryError> {
    let value = content_type.ok_or(BoundaryError::MissingHeader)?.trim();
    if value.is_empty() {
        return Err(BoundaryError::EmptyHeader);
    }

    let Some((media_type, params)) = value.split_once(';') else {
        return Err(BoundaryError::BoundaryMissing);
    };

    let boundary = params
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| unquote(value.trim()))
        .filter(|value| !value.is_empty())
        .ok_or(BoundaryError::BoundaryNotSet)?;
    let token = BoundaryToken::new(boundary)?;

    if !media_type.trim().eq_ignore_ascii_case(BUNDLE_MEDIA_TYPE) {
        return Err(BoundaryError::WrongMediaType);
    }

    Ok(token)
}

/// Extract the boundary from the `Content-Type` entry of a header map.
///
/// Reads the header exactly once.
pub fn extract_boundary_from_headers(headers: &HeaderMap) -> Result<BoundaryToken, BoundaryError> {
    let value = match headers.get(CONTENT_TYPE) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| BoundaryError::InvalidHeaderValue)?,
        ),
        None => None,
    };
    extract_boundary(value)
}

fn is_boundary_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || BOUNDARY_PUNCTUATION.contains(&c)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
