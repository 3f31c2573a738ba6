//! # dav-bundle
//!
//! Request bundling for file-access servers, built on [Axum](https://github.com/tokio-rs/axum).
//!
//! A client packs several file operations (PROPFIND, PUT, GET, DELETE,
//! MKCOL, ...) into one `multipart/related` request and receives one
//! `multipart/related` response holding each operation's result, in order.
//!
//! ## Features
//!
//! - **Strict envelope checks:** a bundle is rejected with a fixed message
//!   before any sub-request runs if its target or `Content-Type` is unusable.
//! - **Failure isolation:** a failing sub-request becomes an error part in the
//!   response; its siblings still run.
//! - **Pluggable storage:** implement [`ResourceTree`] for your backend, or use
//!   [`MemoryTree`] for tests and demos.
//! - **Bounded concurrency:** optionally dispatch several sub-requests at once
//!   while keeping response order.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use dav_bundle::{BundleServiceBuilder, MemoryTree};
//!
//! # async fn run() -> std::io::Result<()> {
//! let tree = MemoryTree::new().with_home("/files/alice");
//! let app = BundleServiceBuilder::new(tree).trace(true).build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await
//! # }
//! ```
//!
//! Wire-format types (boundaries, parts, sub-requests and outcomes) live in
//! `dav-bundle-core` and are re-exported here.

pub mod config;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod limits;
pub mod service_builder;
pub mod tree;

#[cfg(test)]
mod testing;

pub use config::{BoundaryPolicy, BundleConfig};
pub use dispatch::Dispatcher;
pub use endpoint::{BundleEngine, BundleEnvelope};
pub use error::BundleError;
pub use handler::{BundleState, bundle_handler, bundle_response};
pub use limits::BundleLimits;
pub use service_builder::BundleServiceBuilder;
pub use tree::{
    BUNDLE_COLLECTION_NAME, BundleCollection, HomeCollection, MemoryNode, MemoryTree,
    ResourceTree, TreeError, TreeNode,
};

pub use dav_bundle_core::{
    BoundaryError, BoundaryToken, BundleBuilder, BundleResponse, DecodeError, EncodedBundle,
    MultipartError, ResponseParseError, SubOutcome, SubRequest, parse_response,
};

// Re-export several crates
pub use dav_bundle_core;
pub use futures;

pub mod prelude {
    //! A prelude for `dav-bundle` providing the most common types.
    pub use crate::config::{BoundaryPolicy, BundleConfig};
    pub use crate::endpoint::{BundleEngine, BundleEnvelope};
    pub use crate::error::BundleError;
    pub use crate::limits::BundleLimits;
    pub use crate::service_builder::BundleServiceBuilder;
    pub use crate::tree::{BundleCollection, MemoryTree, ResourceTree, TreeError, TreeNode};
    pub use dav_bundle_core::{BundleBuilder, SubOutcome, SubRequest};
}
