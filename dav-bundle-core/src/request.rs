//! Sub-request decoding and bundle request encoding.
//!
//! Every part of a bundle carries a pseudo request-line in the
//! `X-Bundle-Request` part header:
//!
//! ```text
//! --<boundary>\r\n
//! X-Bundle-Request: PUT /photos/cat.jpg\r\n
//! Content-ID: 7\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <file bytes>\r\n
//! ```
//!
//! The path is relative to the collection the bundle was posted to.
//! `Content-ID` is optional and is echoed on the matching response part.

use bytes::{Bytes, BytesMut};
use http::header::InvalidHeaderValue;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::content_type::BoundaryToken;
use crate::error::DecodeError;
use crate::multipart::{RawPart, write_close, write_part};

/// Part header carrying `<METHOD> <path>`.
pub const BUNDLE_REQUEST_HEADER: HeaderName = HeaderName::from_static("x-bundle-request");

/// Part header correlating request and response parts.
pub const CONTENT_ID: HeaderName = HeaderName::from_static("content-id");

/// One decoded unit of work inside a bundle.
#[derive(Clone, Debug)]
pub struct SubRequest {
    pub method: Method,
    /// Path relative to the bundle's target collection.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Correlation token echoed on the outcome.
    pub content_id: Option<HeaderValue>,
}

impl SubRequest {
    /// Create a sub-request with no headers and an empty body.
    pub fn new<S: Into<String>>(method: Method, path: S) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            content_id: None,
        }
    }

    /// Set the body.
    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the correlation token.
    pub fn with_content_id(mut self, content_id: HeaderValue) -> Self {
        self.content_id = Some(content_id);
        self
    }

    /// Part headers announcing this sub-request on the wire.
    pub fn part_headers(&self) -> Result<HeaderMap, InvalidHeaderValue> {
        let mut headers = HeaderMap::with_capacity(self.headers.len() + 2);
        if let Some(content_id) = &self.content_id {
            headers.insert(CONTENT_ID, content_id.clone());
        }
        let line = format!("{} {}", self.method, self.path);
        headers.insert(BUNDLE_REQUEST_HEADER, HeaderValue::from_str(&line)?);
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        Ok(headers)
    }
}

/// Decode one raw part into a sub-request.
///
/// `index` is the part's position in the envelope and is used in errors.
pub fn decode_part(part: RawPart, index: usize) -> Result<SubRequest, DecodeError> {
    let RawPart { mut headers, body } = part;

    let mut lines = headers.get_all(&BUNDLE_REQUEST_HEADER).iter();
    let line = lines.next().ok_or(DecodeError::MissingRequestLine {
        index,
        header: "X-Bundle-Request",
    })?;
    if lines.next().is_some() {
        return Err(DecodeError::MalformedRequestLine {
            index,
            detail: "request line given more than once".into(),
        });
    }
    let (method, path) = parse_request_line(line, index)?;

    headers.remove(&BUNDLE_REQUEST_HEADER);
    let content_id = headers.remove(&CONTENT_ID);

    Ok(SubRequest {
        method,
        path,
        headers,
        body,
        content_id,
    })
}

/// Decode every part, preserving order.
pub fn decode_parts(parts: Vec<RawPart>) -> Result<Vec<SubRequest>, DecodeError> {
    parts
        .into_iter()
        .enumerate()
        .map(|(index, part)| decode_part(part, index))
        .collect()
}

fn parse_request_line(line: &HeaderValue, index: usize) -> Result<(Method, String), DecodeError> {
    let malformed = |detail: String| DecodeError::MalformedRequestLine { index, detail };

    let line = line
        .to_str()
        .map_err(|_| malformed("request line is not visible ASCII".into()))?;
    let mut tokens = line.split_whitespace();
    let (Some(method), Some(path), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        return Err(malformed(format!("expected '<METHOD> <path>', got {line:?}")));
    };
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| malformed(format!("invalid method {method:?}")))?;

    Ok((method, path.to_string()))
}

/// A bundle request ready to send.
#[derive(Clone, Debug)]
pub struct EncodedBundle {
    pub boundary: BoundaryToken,
    pub body: Bytes,
}

impl EncodedBundle {
    /// `Content-Type` value for the outer request.
    pub fn content_type(&self) -> String {
        self.boundary.content_type()
    }
}

/// Client-side builder for bundle request bodies.
///
/// # Example
///
/// ```
/// use dav_bundle_core::{BundleBuilder, SubRequest};
/// use http::Method;
///
/// let bundle = BundleBuilder::new()
///     .add(SubRequest::new(Method::PUT, "notes.txt").with_body("hello"))
///     .unwrap()
///     .add(SubRequest::new(Method::GET, "notes.txt"))
///     .unwrap()
///     .build();
///
/// assert!(bundle.content_type().starts_with("multipart/related; boundary="));
/// ```
#[derive(Debug)]
pub struct BundleBuilder {
    boundary: BoundaryToken,
    buf: BytesMut,
}

impl Default for BundleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleBuilder {
    /// Start a bundle framed by a freshly generated boundary.
    pub fn new() -> Self {
        Self::with_boundary(BoundaryToken::generate())
    }

    /// Start a bundle framed by the given boundary.
    pub fn with_boundary(boundary: BoundaryToken) -> Self {
        Self {
            boundary,
            buf: BytesMut::new(),
        }
    }

    /// Append a sub-request as the next part.
    pub fn add(mut self, request: SubRequest) -> Result<Self, InvalidHeaderValue> {
        let headers = request.part_headers()?;
        write_part(&mut self.buf, &self.boundary, &headers, &request.body);
        Ok(self)
    }

    /// Close the envelope.
    pub fn build(mut self) -> EncodedBundle {
        write_close(&mut self.buf, &self.boundary);
        EncodedBundle {
            boundary: self.boundary,
            body: self.buf.freeze(),
        }
    }
}
