//! Engine configuration - server-wide static settings.
//!
//! Set once at startup and copied into every `handle_bundle` call.

use std::time::Duration;

use crate::limits::BundleLimits;

/// How the response boundary is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Draw a fresh random boundary for every response.
    #[default]
    Generate,
    /// Echo the request's boundary, unless it occurs in a response body.
    Reuse,
}

/// Configuration for [`BundleEngine`](crate::BundleEngine).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BundleConfig {
    /// Body and part-count limits.
    pub limits: BundleLimits,
    /// Maximum number of sub-requests in flight; 1 dispatches sequentially.
    pub concurrency: usize,
    /// Response boundary choice.
    pub boundary: BoundaryPolicy,
    /// Deadline for a whole bundle.
    pub timeout: Option<Duration>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            limits: BundleLimits::default(),
            concurrency: 1,
            boundary: BoundaryPolicy::default(),
            timeout: None,
        }
    }
}

impl BundleConfig {
    /// Default configuration: sequential dispatch, generated boundaries, no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the body and part-count limits.
    pub fn limits(mut self, limits: BundleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the number of sub-requests dispatched concurrently.
    ///
    /// Values below 1 are treated as 1.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the response boundary policy.
    pub fn boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary = policy;
        self
    }

    /// Set a deadline for the whole bundle.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
