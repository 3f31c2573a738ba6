//! Bundle wire-format errors.
//!
//! This module provides the error types raised while reading a bundle:
//! - [`BoundaryError`]: `Content-Type` header validation failures
//! - [`MultipartError`]: Multipart framing failures
//! - [`DecodeError`]: Sub-request decoding failures
//! - [`ResponseParseError`]: Client-side failures reading a bundled response
//!
//! The `Display` text of [`BoundaryError`] is part of the protocol contract:
//! clients match on these exact messages.

/// Failures while validating the envelope `Content-Type` header.
///
/// Variants are listed in the order the checks run.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BoundaryError {
    /// The header is absent.
    #[error("Content-Type header is needed")]
    MissingHeader,

    /// The header is present but blank.
    #[error("Content-Type header must not be empty")]
    EmptyHeader,

    /// The header value contains bytes that are not visible ASCII.
    #[error("Content-Type header must be visible ASCII")]
    InvalidHeaderValue,

    /// No parameter section follows the media type.
    #[error("Improper Content-type format. Boundary may be missing")]
    BoundaryMissing,

    /// A parameter section exists but carries no usable `boundary`.
    #[error("Boundary is not set")]
    BoundaryNotSet,

    /// The media type is not the bundling media type.
    #[error("Content-Type must be multipart/related")]
    WrongMediaType,
}

/// Failures while splitting a multipart body into parts.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MultipartError {
    /// The opening delimiter never appears in the body.
    #[error("opening boundary delimiter not found")]
    MissingDelimiter,

    /// The body ends without `--<boundary>--`.
    #[error("closing boundary delimiter not found")]
    MissingCloseDelimiter,

    /// A delimiter line has trailing bytes other than whitespace.
    #[error("unexpected bytes after boundary delimiter in part {index}")]
    InvalidDelimiter { index: usize },

    /// A part has no blank line between its headers and body.
    #[error("part {index} has no header/body separator")]
    MissingHeaderSeparator { index: usize },

    /// A part header line cannot be parsed.
    #[error("part {index} has an invalid header line: {detail}")]
    InvalidHeader { index: usize, detail: String },

    /// The envelope holds no parts at all.
    #[error("bundle contains no parts")]
    Empty,

    /// The envelope holds more parts than allowed.
    #[error("bundle contains more than {max} parts")]
    TooManyParts { max: usize },
}

/// Failures while turning a raw part into a sub-request or outcome.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The part has no request-line header.
    #[error("part {index} is missing the {header} header")]
    MissingRequestLine { index: usize, header: &'static str },

    /// The request-line header is not `<METHOD> <path>`.
    #[error("part {index} has a malformed request line: {detail}")]
    MalformedRequestLine { index: usize, detail: String },

    /// The response part has no usable status header.
    #[error("part {index} has a malformed status: {detail}")]
    MalformedStatus { index: usize, detail: String },
}

impl DecodeError {
    /// Index of the offending part within the envelope.
    pub fn part_index(&self) -> usize {
        match self {
            DecodeError::MissingRequestLine { index, .. }
            | DecodeError::MalformedRequestLine { index, .. }
            | DecodeError::MalformedStatus { index, .. } => *index,
        }
    }
}

/// Failures while reading a bundled response on the client side.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResponseParseError {
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
