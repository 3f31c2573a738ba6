//! Size limits for bundle requests.
//!
//! Bundles carry file uploads, so the default body limit is larger than a
//! typical API request. Both limits can be lifted for trusted deployments.

/// Default maximum bundle body size (64 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// Default maximum number of parts in one bundle.
pub const DEFAULT_MAX_PARTS: usize = 1000;

/// Limits enforced while reading and splitting a bundle.
///
/// # Example
///
/// ```rust
/// use dav_bundle::BundleLimits;
///
/// // 64 MB bodies, at most 1000 parts
/// let limits = BundleLimits::default();
///
/// // 8 MB bodies, at most 50 parts
/// let limits = BundleLimits::new(8 * 1024 * 1024, 50);
///
/// // No limits (trusted environments only)
/// let limits = BundleLimits::unlimited();
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BundleLimits {
    /// `None` means unlimited.
    max_body_size: Option<usize>,
    /// `None` means unlimited.
    max_parts: Option<usize>,
}

impl Default for BundleLimits {
    fn default() -> Self {
        Self {
            max_body_size: Some(DEFAULT_MAX_BODY_SIZE),
            max_parts: Some(DEFAULT_MAX_PARTS),
        }
    }
}

impl BundleLimits {
    /// Create limits with the given body size in bytes and part count.
    pub fn new(max_body_size: usize, max_parts: usize) -> Self {
        Self {
            max_body_size: Some(max_body_size),
            max_parts: Some(max_parts),
        }
    }

    /// Create limits with no maximum.
    ///
    /// # Security Warning
    ///
    /// Unlimited bodies let a client exhaust server memory with one request.
    pub fn unlimited() -> Self {
        Self {
            max_body_size: None,
            max_parts: None,
        }
    }

    /// Replace the body size limit.
    pub fn with_max_body_size(mut self, max_body_size: Option<usize>) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Replace the part count limit.
    pub fn with_max_parts(mut self, max_parts: Option<usize>) -> Self {
        self.max_parts = max_parts;
        self
    }

    /// Returns the maximum body size, or `None` if unlimited.
    pub fn max_body_size(&self) -> Option<usize> {
        self.max_body_size
    }

    /// Returns the maximum part count, or `None` if unlimited.
    pub fn max_parts(&self) -> Option<usize> {
        self.max_parts
    }
}
