//! Core wire format for bundled file-access requests.
//!
//! This crate provides the transport-independent pieces shared by the server
//! (`dav-bundle`) and by clients that build bundles.
//!
//! ## Modules
//!
//! - `error`: Envelope, framing and decoding errors
//! - `content_type`: `Content-Type` validation and boundary extraction
//! - `multipart`: Splitting a multipart body into raw parts
//! - `request`: Sub-request decoding and client-side bundle encoding
//! - `response`: Outcome assembly and client-side response parsing

mod content_type;
mod error;
mod multipart;
mod request;
mod response;

pub use content_type::*;
pub use error::*;
pub use multipart::*;
pub use request::*;
pub use response::*;
