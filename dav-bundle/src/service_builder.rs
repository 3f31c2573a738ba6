//! Router builder for bundle services.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dav_bundle::{BundleServiceBuilder, MemoryTree};
//!
//! let tree = MemoryTree::new().with_home("/files/alice");
//! let app = BundleServiceBuilder::new(tree)
//!     .concurrency(4)
//!     .trace(true)
//!     .build();
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::post;
use tower_http::trace::TraceLayer;

use crate::config::{BoundaryPolicy, BundleConfig};
use crate::endpoint::BundleEngine;
use crate::handler::{BundleState, bundle_handler};
use crate::limits::BundleLimits;
use crate::tree::ResourceTree;

/// Builds an [`axum::Router`] that accepts bundles on `POST` to any path.
pub struct BundleServiceBuilder<T> {
    tree: Arc<T>,
    config: BundleConfig,
    trace: bool,
}

impl<T> BundleServiceBuilder<T>
where
    T: ResourceTree + 'static,
{
    /// Creates a builder serving `tree` with the default configuration.
    pub fn new(tree: T) -> Self {
        Self::from_arc(Arc::new(tree))
    }

    /// Creates a builder serving a shared tree.
    pub fn from_arc(tree: Arc<T>) -> Self {
        Self {
            tree,
            config: BundleConfig::default(),
            trace: false,
        }
    }

    /// Replace the whole engine configuration.
    pub fn config(mut self, config: BundleConfig) -> Self {
        self.config = config;
        self
    }

    /// Set body and part-count limits.
    ///
    /// Default is 64 MB and 1000 parts.
    pub fn limits(mut self, limits: BundleLimits) -> Self {
        self.config = self.config.limits(limits);
        self
    }

    /// Dispatch up to `concurrency` sub-requests at once.
    ///
    /// Default is 1 (sequential).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config = self.config.concurrency(concurrency);
        self
    }

    pub fn boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.config = self.config.boundary_policy(policy);
        self
    }

    /// Fail bundles that take longer than `timeout` with `504`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Wrap the router in a `tower_http` trace layer.
    pub fn trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    pub fn build(self) -> Router {
        let state = BundleState {
            tree: self.tree,
            engine: Arc::new(BundleEngine::new(self.config)),
        };
        let router = Router::new()
            .route("/", post(bundle_handler::<T>))
            .route("/{*path}", post(bundle_handler::<T>))
            .with_state(state);

        if self.trace {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        }
    }
}
