//! Multipart framing for bundle bodies.
//!
//! A bundle body is a sequence of parts separated by boundary delimiters:
//!
//! ```text
//! [preamble]
//! --<boundary>\r\n
//! Header-Name: value\r\n
//! \r\n
//! body bytes\r\n
//! --<boundary>\r\n
//! ...
//! --<boundary>--\r\n
//! [epilogue]
//! ```
//!
//! Both CRLF and bare LF line endings are accepted when reading. Writing
//! always uses CRLF. When the blank line after a header block is the line
//! break owned by the next delimiter, the part has an empty body.

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::content_type::BoundaryToken;
use crate::error::MultipartError;

/// One part sliced out of a multipart body.
#[derive(Clone, Debug, Default)]
pub struct RawPart {
    /// Part-level headers in the order they appeared.
    pub headers: HeaderMap,
    /// Part body, verbatim. Shares storage with the envelope body.
    pub body: Bytes,
}

/// Split a multipart body into its parts.
///
/// Parts are returned in envelope order.
pub fn split(body: &Bytes, boundary: &BoundaryToken) -> Result<Vec<RawPart>, MultipartError> {
    split_with_limit(body, boundary, None)
}

/// Split a multipart body, failing once more than `max_parts` parts are seen.
pub fn split_with_limit(
    body: &Bytes,
    boundary: &BoundaryToken,
    max_parts: Option<usize>,
) -> Result<Vec<RawPart>, MultipartError> {
    let delimiter = boundary.delimiter();
    let mut pos =
        find_delimiter(body, &delimiter, 0).ok_or(MultipartError::MissingDelimiter)?;
    let mut parts = Vec::new();

    loop {
        let after = pos + delimiter.len();
        if body[after..].starts_with(b"--") {
            if parts.is_empty() {
                return Err(MultipartError::Empty);
            }
            return Ok(parts);
        }

        let index = parts.len();
        let content_start = skip_delimiter_line(body, after, index)?;
        let next = find_delimiter(body, &delimiter, content_start)
            .ok_or(MultipartError::MissingCloseDelimiter)?;
        let content_end = strip_line_break(body, content_start, next);

        if let Some(max) = max_parts {
            if index >= max {
                return Err(MultipartError::TooManyParts { max });
            }
        }

        parts.push(parse_part(body.slice(content_start..content_end), index)?);
        pos = next;
    }
}

/// Write one part (delimiter line, headers, blank line, body, line break).
pub fn write_part(buf: &mut BytesMut, boundary: &BoundaryToken, headers: &HeaderMap, body: &[u8]) {
    buf.put_slice(&boundary.delimiter());
    buf.put_slice(b"\r\n");
    for (name, value) in headers {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"\r\n");
    buf.put_slice(body);
    buf.put_slice(b"\r\n");
}

/// Write the closing delimiter.
pub fn write_close(buf: &mut BytesMut, boundary: &BoundaryToken) {
    buf.put_slice(&boundary.delimiter());
    buf.put_slice(b"--\r\n");
}

/// Find the next delimiter at the start of a line, at or after `from`.
///
/// A candidate only counts when followed by `--`, whitespace, a line break
/// or the end of the body.
fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let mut start = from;
    while start + delimiter.len() <= body.len() {
        let offset = body[start..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)?;
        let idx = start + offset;
        let at_line_start = idx == 0 || body[idx - 1] == b'\n';
        let rest = &body[idx + delimiter.len()..];
        let well_terminated = rest.is_empty()
            || rest.starts_with(b"--")
            || matches!(rest[0], b' ' | b'\t' | b'\r' | b'\n');
        if at_line_start && well_terminated {
            return Some(idx);
        }
        start = idx + 1;
    }
    None
}

/// Skip linear whitespace and the line break ending a delimiter line.
fn skip_delimiter_line(body: &[u8], mut pos: usize, index: usize) -> Result<usize, MultipartError> {
    while pos < body.len() && matches!(body[pos], b' ' | b'\t') {
        pos += 1;
    }
    match &body[pos..] {
        [] | [b'\r'] => Err(MultipartError::MissingCloseDelimiter),
        [b'\r', b'\n', ..] => Ok(pos + 2),
        [b'\n', ..] => Ok(pos + 1),
        _ => Err(MultipartError::InvalidDelimiter { index }),
    }
}

/// The line break before a delimiter belongs to the delimiter, not the part.
fn strip_line_break(body: &[u8], start: usize, delimiter_at: usize) -> usize {
    let mut end = delimiter_at;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

/// Locate the blank line ending the header block.
///
/// `content` has already lost the line break before the next delimiter, so
/// empty content or a trailing header line break means the headers ran up
/// to the delimiter and the body is empty.
///
/// Returns `(header_end, body_start)`.
fn find_blank_line(content: &[u8]) -> Option<(usize, usize)> {
    if content.is_empty() {
        return Some((0, 0));
    }
    if content.starts_with(b"\r\n") {
        return Some((0, 2));
    }
    if content.starts_with(b"\n") {
        return Some((0, 1));
    }
    content.iter().enumerate().find_map(|(i, &b)| {
        if b != b'\n' {
            return None;
        }
        match &content[i + 1..] {
            [b'\n', ..] => Some((i + 1, i + 2)),
            [b'\r', b'\n', ..] => Some((i + 1, i + 3)),
            [] => Some((i + 1, i + 1)),
            _ => None,
        }
    })
}

fn parse_part(content: Bytes, index: usize) -> Result<RawPart, MultipartError> {
    let (header_end, body_start) =
        find_blank_line(&content).ok_or(MultipartError::MissingHeaderSeparator { index })?;
    let headers = parse_headers(&content[..header_end], index)?;
    Ok(RawPart {
        headers,
        body: content.slice(body_start..),
    })
}

fn parse_headers(block: &[u8], index: usize) -> Result<HeaderMap, MultipartError> {
    let invalid = |detail: String| MultipartError::InvalidHeader { index, detail };

    // Unfold continuation lines before building the map.
    let mut fields: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if matches!(line[0], b' ' | b'\t') {
            let (_, value) = fields
                .last_mut()
                .ok_or_else(|| invalid("continuation line without a header".into()))?;
            value.push(b' ');
            value.extend_from_slice(line.trim_ascii());
            continue;
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| invalid(format!("missing ':' in {:?}", String::from_utf8_lossy(line))))?;
        fields.push((
            line[..colon].trim_ascii().to_vec(),
            line[colon + 1..].trim_ascii().to_vec(),
        ));
    }

    let mut headers = HeaderMap::with_capacity(fields.len());
    for (name, value) in fields {
        let name = HeaderName::from_bytes(&name).map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_bytes(&value).map_err(|e| invalid(e.to_string()))?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary() -> BoundaryToken {
        BoundaryToken::new("test_boundrary").unwrap()
    }

    #[test]
    fn test_split_two_parts() {
        let body = Bytes::from_static(
            b"--test_boundrary\r\n\
              X-Bundle-Request: GET /a.txt\r\n\
              \r\n\
              \r\n\
              --test_boundrary\r\n\
              X-Bundle-Request: PUT /b.txt\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              hello\r\n\
              --test_boundrary--\r\n",
        );
        let parts = split(&body, &boundary()).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].headers["x-bundle-request"], "GET /a.txt");
        assert!(parts[0].body.is_empty());
        assert_eq!(parts[1].headers["content-type"], "text/plain");
        assert_eq!(&parts[1].body[..], b"hello");
    }

    #[test]
    fn test_split_ignores_preamble_and_epilogue() {
        let body = Bytes::from_static(
            b"this is a preamble\r\n\
              --test_boundrary\r\n\
              A: 1\r\n\
              \r\n\
              body\r\n\
              --test_boundrary--\r\n\
              epilogue",
        );
        let parts = split(&body, &boundary()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(&parts[0].body[..], b"body");
    }

    #[test]
    fn test_split_accepts_bare_lf() {
        let body = Bytes::from_static(b"--test_boundrary\nA: 1\n\nbody\n--test_boundrary--\n");
        let parts = split(&body, &boundary()).unwrap();
        assert_eq!(parts[0].headers["a"], "1");
        assert_eq!(&parts[0].body[..], b"body");
    }

    #[test]
    fn test_split_keeps_body_line_breaks() {
        let body = Bytes::from_static(
            b"--test_boundrary\r\n\r\nline one\r\nline two\r\n\r\n--test_boundrary--",
        );
        let parts = split(&body, &boundary()).unwrap();
        assert!(parts[0].headers.is_empty());
        assert_eq!(&parts[0].body[..], b"line one\r\nline two\r\n");
    }

    #[test]
    fn test_split_delimiter_prefix_inside_body_is_content() {
        let body = Bytes::from_static(
            b"--test_boundrary\r\n\r\n--test_boundrary_not_really\r\n--test_boundrary--",
        );
        let parts = split(&body, &boundary()).unwrap();
        assert_eq!(&parts[0].body[..], b"--test_boundrary_not_really");
    }

    #[test]
    fn test_split_missing_delimiter() {
        let body = Bytes::from_static(b"no delimiters here");
        assert_eq!(
            split(&body, &boundary()).unwrap_err(),
            MultipartError::MissingDelimiter
        );
    }

    #[test]
    fn test_split_missing_close_delimiter() {
        let body = Bytes::from_static(b"--test_boundrary\r\nA: 1\r\n\r\nbody\r\n");
        assert_eq!(
            split(&body, &boundary()).unwrap_err(),
            MultipartError::MissingCloseDelimiter
        );

        let body = Bytes::from_static(b"--test_boundrary");
        assert_eq!(
            split(&body, &boundary()).unwrap_err(),
            MultipartError::MissingCloseDelimiter
        );
    }

    #[test]
    fn test_split_missing_header_separator() {
        let body = Bytes::from_static(b"--test_boundrary\r\nA: 1\r\n--test_boundrary--");
        assert_eq!(
            split(&body, &boundary()).unwrap_err(),
            MultipartError::MissingHeaderSeparator { index: 0 }
        );
    }

    #[test]
    fn test_split_headers_run_into_delimiter() {
        let body = Bytes::from_static(
            b"--test_boundrary\r\n\
              X-Bundle-Request: GET /a\r\n\
              \r\n\
              --test_boundrary\n\
              A: 1\n\
              B: 2\n\
              \n\
              --test_boundrary\r\n\
              \r\n\
              --test_boundrary--",
        );
        let parts = split(&body, &boundary()).unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].headers["x-bundle-request"], "GET /a");
        assert!(parts[0].body.is_empty());
        assert_eq!(parts[1].headers["a"], "1");
        assert_eq!(parts[1].headers["b"], "2");
        assert!(parts[1].body.is_empty());
        assert!(parts[2].headers.is_empty());
        assert!(parts[2].body.is_empty());
    }

    #[test]
    fn test_split_invalid_header_line() {
        let body = Bytes::from_static(
            b"--test_boundrary\r\nnot a header\r\n\r\nbody\r\n--test_boundrary--",
        );
        assert!(matches!(
            split(&body, &boundary()).unwrap_err(),
            MultipartError::InvalidHeader { index: 0, .. }
        ));
    }

    #[test]
    fn test_split_delimiter_trailing_garbage() {
        let body = Bytes::from_static(b"--test_boundrary  x\r\n\r\nbody\r\n--test_boundrary--");
        assert_eq!(
            split(&body, &boundary()).unwrap_err(),
            MultipartError::InvalidDelimiter { index: 0 }
        );
    }

    #[test]
    fn test_split_empty_envelope() {
        let body = Bytes::from_static(b"--test_boundrary--\r\n");
        assert_eq!(split(&body, &boundary()).unwrap_err(), MultipartError::Empty);
    }

    #[test]
    fn test_split_with_limit() {
        let body = Bytes::from_static(
            b"--test_boundrary\r\n\r\na\r\n--test_boundrary\r\n\r\nb\r\n--test_boundrary--",
        );
        assert_eq!(
            split_with_limit(&body, &boundary(), Some(1)).unwrap_err(),
            MultipartError::TooManyParts { max: 1 }
        );
        assert_eq!(split_with_limit(&body, &boundary(), Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn test_split_unfolds_continuation_lines() {
        let body = Bytes::from_static(
            b"--test_boundrary\r\nX-Long: first\r\n  second\r\n\r\n\r\n--test_boundrary--",
        );
        let parts = split(&body, &boundary()).unwrap();
        assert_eq!(parts[0].headers["x-long"], "first second");
    }

    #[test]
    fn test_write_then_split() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", HeaderValue::from_static("yes"));

        let mut buf = BytesMut::new();
        write_part(&mut buf, &boundary(), &headers, b"payload\r\n");
        write_part(&mut buf, &boundary(), &HeaderMap::new(), b"");
        write_close(&mut buf, &boundary());

        let parts = split(&buf.freeze(), &boundary()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].headers["x-test"], "yes");
        assert_eq!(&parts[0].body[..], b"payload\r\n");
        assert!(parts[1].body.is_empty());
    }
}
