//! The resource tree seam.
//!
//! The bundling engine never touches storage directly. It asks a
//! [`ResourceTree`] to resolve the bundle's target and to execute each
//! sub-request as an ordinary HTTP request. Any file server can plug in
//! by implementing these traits; [`MemoryTree`] is the in-process
//! implementation used by the tests and the example server.

use std::future::Future;

use axum::http::StatusCode;
use bytes::Bytes;

mod memory;

pub use memory::{HomeCollection, MemoryNode, MemoryTree};

/// Name of the bundle-collection capability, used in rejection messages.
pub const BUNDLE_COLLECTION_NAME: &str = "BundleCollection";

/// A collection that accepts bundled requests.
pub trait BundleCollection: Send + Sync {
    /// Absolute path sub-requests are scoped under, e.g. `/files/alice`.
    fn collection_path(&self) -> &str;
}

/// A resolved node in the tree.
pub trait TreeNode: Send {
    /// Returns the node's bundle capability, if it has one.
    fn as_bundle_collection(&self) -> Option<&dyn BundleCollection>;
}

/// Faults reported by a resource tree.
///
/// All variants except [`TreeError::Unavailable`] describe a single
/// request and are reported back to the client as that request's status.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    /// The tree itself is unusable; no further request can succeed.
    #[error("tree unavailable: {0}")]
    Unavailable(String),
}

impl TreeError {
    /// HTTP status reported for this fault.
    pub fn status(&self) -> StatusCode {
        match self {
            TreeError::NotFound(_) => StatusCode::NOT_FOUND,
            TreeError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            TreeError::Conflict(_) => StatusCode::CONFLICT,
            TreeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            TreeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            TreeError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            TreeError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether this fault aborts the whole bundle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TreeError::Unavailable(_))
    }
}

/// Storage collaborator of the bundling engine.
///
/// Paths are absolute and `/`-separated. `execute` receives a request whose
/// URI path is already scoped beneath the bundle's collection.
pub trait ResourceTree: Send + Sync {
    type Node: TreeNode;

    /// Resolve `path` to a node.
    fn resolve(&self, path: &str) -> impl Future<Output = Result<Self::Node, TreeError>> + Send;

    /// Run one request against the tree.
    ///
    /// The URI path arrives percent-encoded as it was on the wire. It never
    /// holds a dot segment, encoded or not, nor an encoded `/` or `\`.
    fn execute(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>, TreeError>> + Send;
}
