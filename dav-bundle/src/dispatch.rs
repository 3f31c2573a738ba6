//! Sub-request dispatch.
//!
//! Each [`SubRequest`] runs as an ordinary request against the resource
//! tree, scoped beneath the bundle's collection. Per-request faults become
//! error outcomes so one failing part never hides its siblings. Only a
//! fatal tree fault aborts the bundle.

use axum::http::StatusCode;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use percent_encoding::percent_decode_str;

use dav_bundle_core::{SubOutcome, SubRequest};

use crate::error::BundleError;
use crate::tree::ResourceTree;

/// Runs sub-requests against one collection of a tree.
pub struct Dispatcher<'a, T> {
    tree: &'a T,
    collection: String,
}

impl<'a, T: ResourceTree> Dispatcher<'a, T> {
    pub fn new<S: Into<String>>(tree: &'a T, collection_path: S) -> Self {
        Self {
            tree,
            collection: collection_path.into(),
        }
    }

    /// Join a sub-request path onto the collection path.
    ///
    /// Segments are checked after percent-decoding but joined as written, so
    /// the tree receives the path still encoded. Returns `None` for any dot
    /// segment and for segments that decode to a path separator.
    pub fn scoped_path(&self, path: &str) -> Option<String> {
        let mut scoped = self.collection.trim_end_matches('/').to_string();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            if decoded == "." || decoded == ".." || decoded.contains(['/', '\\']) {
                return None;
            }
            scoped.push('/');
            scoped.push_str(segment);
        }
        if scoped.is_empty() {
            scoped.push('/');
        }
        Some(scoped)
    }

    /// Execute one sub-request.
    ///
    /// The returned outcome echoes the request's `Content-ID`.
    pub async fn dispatch(&self, request: SubRequest) -> Result<SubOutcome, BundleError> {
        let SubRequest {
            method,
            path,
            headers,
            body,
            content_id,
        } = request;

        let outcome = match self.scoped_path(&path) {
            None => SubOutcome::error(
                StatusCode::FORBIDDEN,
                format!("{path} is outside the bundle collection"),
            ),
            Some(target) => {
                let built = http::Request::builder()
                    .method(method.clone())
                    .uri(target.as_str())
                    .body(body);
                match built {
                    Err(err) => SubOutcome::error(
                        StatusCode::BAD_REQUEST,
                        format!("invalid target {target}: {err}"),
                    ),
                    Ok(mut req) => {
                        *req.headers_mut() = headers;
                        self.execute(req).await?
                    }
                }
            }
        };

        tracing::debug!(
            method = %method,
            path = %path,
            status = outcome.status.as_u16(),
            "dispatched bundled request"
        );
        Ok(outcome.with_content_id(content_id))
    }

    /// Execute all sub-requests, keeping up to `concurrency` in flight.
    ///
    /// Outcomes are returned in request order. A fatal fault drops the
    /// requests still in flight.
    pub async fn dispatch_all(
        &self,
        requests: Vec<SubRequest>,
        concurrency: usize,
    ) -> Result<Vec<SubOutcome>, BundleError> {
        stream::iter(requests)
            .map(|request| self.dispatch(request))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }

    async fn execute(&self, request: http::Request<Bytes>) -> Result<SubOutcome, BundleError> {
        match self.tree.execute(request).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                Ok(SubOutcome::new(parts.status)
                    .with_headers(parts.headers)
                    .with_body(body))
            }
            Err(err) if err.is_fatal() => {
                tracing::error!(error = %err, "resource tree failed during bundle");
                Err(BundleError::internal(err.to_string()))
            }
            Err(err) => Ok(SubOutcome::error(err.status(), err.to_string())),
        }
    }
}
