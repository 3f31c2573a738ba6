//! Outcome assembly and bundled-response parsing.
//!
//! Each sub-request yields exactly one response part, in request order:
//!
//! ```text
//! --<boundary>\r\n
//! Content-ID: 7\r\n
//! X-Bundle-Status: 201 Created\r\n
//! ETag: "3"\r\n
//! Content-Length: 0\r\n
//! \r\n
//! \r\n
//! --<boundary>--\r\n
//! ```

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::content_type::{BoundaryToken, extract_boundary};
use crate::error::{DecodeError, ResponseParseError};
use crate::multipart::{RawPart, split, write_close, write_part};
use crate::request::CONTENT_ID;

/// Part header carrying `<code> <reason>` for each outcome.
pub const BUNDLE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-bundle-status");

/// The result of one sub-request.
#[derive(Clone, Debug)]
pub struct SubOutcome {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Echo of the request part's `Content-ID`.
    pub content_id: Option<HeaderValue>,
}

impl SubOutcome {
    /// Create an outcome with no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            content_id: None,
        }
    }

    /// Create an error outcome with a plain-text message body.
    pub fn error<S: Into<String>>(status: StatusCode, message: S) -> Self {
        let message: String = message.into();
        let mut outcome = Self::new(status).with_body(message);
        outcome.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        outcome
    }

    /// Set the body.
    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Replace the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the echoed correlation token.
    pub fn with_content_id(mut self, content_id: Option<HeaderValue>) -> Self {
        self.content_id = content_id;
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    fn part_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(self.headers.len() + 3);
        if let Some(content_id) = &self.content_id {
            headers.insert(CONTENT_ID, content_id.clone());
        }
        headers.insert(BUNDLE_STATUS_HEADER, status_line(self.status));
        // Framing headers are owned by the part, never by the outcome.
        for (name, value) in &self.headers {
            if *name != CONTENT_LENGTH && *name != CONTENT_ID && *name != BUNDLE_STATUS_HEADER {
                headers.append(name.clone(), value.clone());
            }
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        headers
    }
}

/// Ordered outcomes plus the boundary that frames them.
#[derive(Clone, Debug)]
pub struct BundleResponse {
    pub boundary: BoundaryToken,
    pub outcomes: Vec<SubOutcome>,
}

impl BundleResponse {
    /// Frame `outcomes` with a freshly generated boundary that occurs in no body.
    pub fn generate(outcomes: Vec<SubOutcome>) -> Self {
        let boundary = loop {
            let candidate = BoundaryToken::generate();
            if !collides(&candidate, &outcomes) {
                break candidate;
            }
        };
        Self { boundary, outcomes }
    }

    /// Frame `outcomes` with `boundary`, or a generated one if `boundary`
    /// occurs inside an outcome body.
    pub fn prefer_boundary(boundary: BoundaryToken, outcomes: Vec<SubOutcome>) -> Self {
        if collides(&boundary, &outcomes) {
            Self::generate(outcomes)
        } else {
            Self { boundary, outcomes }
        }
    }

    /// Frame `outcomes` with the given boundary.
    pub fn with_boundary(boundary: BoundaryToken, outcomes: Vec<SubOutcome>) -> Self {
        Self { boundary, outcomes }
    }

    /// `Content-Type` value for the outer response.
    pub fn content_type(&self) -> String {
        self.boundary.content_type()
    }

    /// Serialize the outcomes into a multipart body.
    pub fn encode(&self) -> Bytes {
        assemble(&self.outcomes, &self.boundary)
    }
}

/// Serialize outcomes into a multipart body framed by `boundary`.
pub fn assemble(outcomes: &[SubOutcome], boundary: &BoundaryToken) -> Bytes {
    let capacity = outcomes.iter().map(|o| o.body.len() + 128).sum::<usize>();
    let mut buf = BytesMut::with_capacity(capacity);
    for outcome in outcomes {
        write_part(&mut buf, boundary, &outcome.part_headers(), &outcome.body);
    }
    write_close(&mut buf, boundary);
    buf.freeze()
}

/// Parse a bundled response from its `Content-Type` value and body.
pub fn parse_response(
    content_type: Option<&str>,
    body: &Bytes,
) -> Result<BundleResponse, ResponseParseError> {
    let boundary = extract_boundary(content_type)?;
    let outcomes = split(body, &boundary)?
        .into_iter()
        .enumerate()
        .map(|(index, part)| decode_outcome(part, index))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BundleResponse { boundary, outcomes })
}

fn decode_outcome(part: RawPart, index: usize) -> Result<SubOutcome, DecodeError> {
    let RawPart { mut headers, body } = part;
    let malformed = |detail: String| DecodeError::MalformedStatus { index, detail };

    let status = headers
        .remove(&BUNDLE_STATUS_HEADER)
        .ok_or_else(|| malformed("status header missing".into()))?;
    let code = status
        .to_str()
        .ok()
        .and_then(|s| s.split_whitespace().next())
        .ok_or_else(|| malformed("status header is empty".into()))?;
    let status = StatusCode::from_bytes(code.as_bytes())
        .map_err(|_| malformed(format!("invalid status code {code:?}")))?;

    let content_id = headers.remove(&CONTENT_ID);
    headers.remove(CONTENT_LENGTH);

    Ok(SubOutcome {
        status,
        headers,
        body,
        content_id,
    })
}

fn status_line(status: StatusCode) -> HeaderValue {
    let line = match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    };
    // Reason phrases are ASCII, so this cannot fail.
    HeaderValue::from_str(&line).unwrap_or_else(|_| HeaderValue::from(status.as_u16()))
}

fn collides(boundary: &BoundaryToken, outcomes: &[SubOutcome]) -> bool {
    let delimiter = boundary.delimiter();
    outcomes.iter().any(|outcome| {
        outcome
            .body
            .windows(delimiter.len())
            .any(|window| window == delimiter.as_slice())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary() -> BoundaryToken {
        BoundaryToken::new("resp_boundary").unwrap()
    }

    #[test]
    fn test_assemble_frames_each_outcome() {
        let outcomes = vec![
            SubOutcome::new(StatusCode::CREATED)
                .with_content_id(Some(HeaderValue::from_static("1"))),
            SubOutcome::error(StatusCode::NOT_FOUND, "missing"),
        ];
        let body = assemble(&outcomes, &boundary());
        let text = std::str::from_utf8(&body).unwrap();

        assert!(text.starts_with(
            "--resp_boundary\r\ncontent-id: 1\r\nx-bundle-status: 201 Created\r\n"
        ));
        assert!(text.contains("x-bundle-status: 404 Not Found\r\n"));
        assert!(text.contains("content-length: 7\r\n\r\nmissing\r\n"));
        assert!(text.ends_with("--resp_boundary--\r\n"));
    }

    #[test]
    fn test_assemble_replaces_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        let outcomes = vec![SubOutcome::new(StatusCode::OK)
            .with_headers(headers)
            .with_body("abc")];
        let body = assemble(&outcomes, &boundary());
        let text = std::str::from_utf8(&body).unwrap();

        assert!(!text.contains("999"));
        assert!(text.contains("content-length: 3\r\n"));
    }

    #[test]
    fn test_assemble_keeps_framing_headers_single() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ID, HeaderValue::from_static("from-tree"));
        headers.insert(BUNDLE_STATUS_HEADER, HeaderValue::from_static("500 Oops"));
        headers.insert("etag", HeaderValue::from_static("\"9\""));
        let outcome = SubOutcome::new(StatusCode::OK)
            .with_headers(headers)
            .with_content_id(Some(HeaderValue::from_static("echo")));

        let part_headers = outcome.part_headers();
        assert_eq!(part_headers.get_all(CONTENT_ID).iter().count(), 1);
        assert_eq!(part_headers[CONTENT_ID], "echo");
        assert_eq!(part_headers.get_all(BUNDLE_STATUS_HEADER).iter().count(), 1);
        assert_eq!(part_headers[BUNDLE_STATUS_HEADER], "200 OK");
        assert_eq!(part_headers["etag"], "\"9\"");

        let response = BundleResponse::with_boundary(boundary(), vec![outcome]);
        let parsed =
            parse_response(Some(&response.content_type()), &response.encode()).unwrap();
        assert_eq!(parsed.outcomes[0].status, StatusCode::OK);
        assert_eq!(parsed.outcomes[0].content_id.as_ref().unwrap(), "echo");
        assert!(parsed.outcomes[0].headers.get(CONTENT_ID).is_none());
        assert!(parsed.outcomes[0].headers.get(BUNDLE_STATUS_HEADER).is_none());
    }

    #[test]
    fn test_assemble_drops_tree_content_id_without_echo() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ID, HeaderValue::from_static("from-tree"));
        let outcome = SubOutcome::new(StatusCode::NO_CONTENT).with_headers(headers);

        assert!(outcome.part_headers().get(CONTENT_ID).is_none());
    }

    #[test]
    fn test_parse_response_reads_assembled_body() {
        let mut etag = HeaderMap::new();
        etag.insert("etag", HeaderValue::from_static("\"2\""));
        let response = BundleResponse::with_boundary(
            boundary(),
            vec![
                SubOutcome::new(StatusCode::OK)
                    .with_headers(etag)
                    .with_body("file contents")
                    .with_content_id(Some(HeaderValue::from_static("a"))),
                SubOutcome::error(StatusCode::CONFLICT, "parent missing"),
            ],
        );

        let parsed =
            parse_response(Some(&response.content_type()), &response.encode()).unwrap();

        assert_eq!(parsed.boundary, boundary());
        assert_eq!(parsed.outcomes.len(), 2);
        assert_eq!(parsed.outcomes[0].status, StatusCode::OK);
        assert_eq!(parsed.outcomes[0].headers["etag"], "\"2\"");
        assert!(parsed.outcomes[0].headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(parsed.outcomes[0].content_id.as_ref().unwrap(), "a");
        assert_eq!(&parsed.outcomes[0].body[..], b"file contents");
        assert_eq!(parsed.outcomes[1].status, StatusCode::CONFLICT);
        assert!(!parsed.outcomes[1].is_success());
        assert_eq!(&parsed.outcomes[1].body[..], b"parent missing");
    }

    #[test]
    fn test_parse_response_missing_status() {
        let body = Bytes::from_static(b"--resp_boundary\r\n\r\nx\r\n--resp_boundary--\r\n");
        let err = parse_response(Some("multipart/related; boundary=resp_boundary"), &body)
            .unwrap_err();
        assert!(matches!(
            err,
            ResponseParseError::Decode(DecodeError::MalformedStatus { index: 0, .. })
        ));
    }

    #[test]
    fn test_generate_avoids_boundaries_in_bodies() {
        let response = BundleResponse::generate(vec![SubOutcome::new(StatusCode::OK)]);
        assert!(!collides(&response.boundary, &response.outcomes));
        assert!(response.content_type().starts_with("multipart/related; boundary=bundle_"));
    }

    #[test]
    fn test_prefer_boundary_falls_back_on_collision() {
        let clean = vec![SubOutcome::new(StatusCode::OK).with_body("plain")];
        assert_eq!(BundleResponse::prefer_boundary(boundary(), clean).boundary, boundary());

        let dirty = vec![SubOutcome::new(StatusCode::OK).with_body("--resp_boundary--")];
        assert_ne!(BundleResponse::prefer_boundary(boundary(), dirty).boundary, boundary());
    }

    #[test]
    fn test_collides_detects_delimiter() {
        let outcomes = vec![SubOutcome::new(StatusCode::OK).with_body("x\r\n--resp_boundary\r\n")];
        assert!(collides(&boundary(), &outcomes));
    }
}
