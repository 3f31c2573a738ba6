//! The bundling endpoint.
//!
//! [`BundleEngine::handle_bundle`] runs the checks in a fixed order and
//! stops at the first failure:
//!
//! 1. the target resolves to a node with the bundle capability
//! 2. `Content-Type` is present, non-empty and carries a boundary
//! 3. the media type is `multipart/related`
//! 4. the body can be read and is not empty
//! 5. the body splits into parts and every part decodes
//!
//! Only then are sub-requests dispatched. No stage runs before the stages
//! ahead of it have passed, so a rejected bundle never touches the tree
//! beyond the initial resolve.

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderMap;
use bytes::Bytes;
use tracing::Instrument;

use dav_bundle_core::{
    BundleResponse, decode_parts, extract_boundary_from_headers, split_with_limit,
};

use crate::config::{BoundaryPolicy, BundleConfig};
use crate::dispatch::Dispatcher;
use crate::error::BundleError;
use crate::tree::{BUNDLE_COLLECTION_NAME, ResourceTree, TreeError, TreeNode};

const UNREADABLE_BODY: &str = "Unable to get request content";

/// An incoming bundle: target path, headers and the unread body.
#[derive(Debug)]
pub struct BundleEnvelope {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl BundleEnvelope {
    pub fn new<S: Into<String>, B: Into<Body>>(path: S, headers: HeaderMap, body: B) -> Self {
        Self {
            path: path.into(),
            headers,
            body: body.into(),
        }
    }

    /// Take the path, headers and body of an HTTP request.
    pub fn from_request(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            body,
        }
    }
}

/// The bundling protocol engine.
///
/// Holds only configuration; the tree is passed into each call.
#[derive(Clone, Debug, Default)]
pub struct BundleEngine {
    config: BundleConfig,
}

impl BundleEngine {
    pub fn new(config: BundleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Validate, split, dispatch and reassemble one bundle.
    pub async fn handle_bundle<T: ResourceTree>(
        &self,
        tree: &T,
        envelope: BundleEnvelope,
    ) -> Result<BundleResponse, BundleError> {
        let span = tracing::info_span!("bundle", path = %envelope.path);
        let work = self.process(tree, envelope).instrument(span);

        match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                tracing::warn!(timeout = ?limit, "bundle timed out");
                BundleError::Timeout(limit)
            })?,
            None => work.await,
        }
    }

    async fn process<T: ResourceTree>(
        &self,
        tree: &T,
        envelope: BundleEnvelope,
    ) -> Result<BundleResponse, BundleError> {
        let BundleEnvelope {
            path,
            headers,
            body,
        } = envelope;

        let collection = resolve_collection(tree, &path).await?;
        tracing::debug!(collection = %collection, "resolved bundle collection");

        let boundary = extract_boundary_from_headers(&headers).map_err(|err| {
            tracing::warn!(error = %err, "rejected bundle content type");
            BundleError::from(err)
        })?;

        let body = self.read_body(body).await?;

        let parts = split_with_limit(&body, &boundary, self.config.limits.max_parts())
            .map_err(|err| reject(format!("Unable to parse bundle body: {err}")))?;
        let requests = decode_parts(parts)
            .map_err(|err| reject(format!("Unable to decode bundled request: {err}")))?;
        tracing::debug!(parts = requests.len(), "decoded bundle");

        let outcomes = Dispatcher::new(tree, collection)
            .dispatch_all(requests, self.config.concurrency)
            .await?;

        let response = match self.config.boundary {
            BoundaryPolicy::Generate => BundleResponse::generate(outcomes),
            BoundaryPolicy::Reuse => BundleResponse::prefer_boundary(boundary, outcomes),
        };
        tracing::debug!(
            parts = response.outcomes.len(),
            failed = response.outcomes.iter().filter(|o| !o.is_success()).count(),
            "assembled bundle response"
        );
        Ok(response)
    }

    async fn read_body(&self, body: Body) -> Result<Bytes, BundleError> {
        let limit = self.config.limits.max_body_size().unwrap_or(usize::MAX);
        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(reject(UNREADABLE_BODY)),
            Err(err) => {
                tracing::debug!(error = %err, "failed to read bundle body");
                Err(reject(UNREADABLE_BODY))
            }
        }
    }
}

/// Resolve `path` and return the collection path sub-requests run under.
async fn resolve_collection<T: ResourceTree>(tree: &T, path: &str) -> Result<String, BundleError> {
    let node = match tree.resolve(path).await {
        Ok(node) => node,
        Err(err @ TreeError::NotFound(_)) => {
            tracing::warn!(error = %err, "bundle target not found");
            return Err(BundleError::NotFound(err.to_string()));
        }
        Err(err) if err.is_fatal() => {
            tracing::error!(error = %err, "resource tree failed during resolve");
            return Err(BundleError::internal(err.to_string()));
        }
        Err(err) => return Err(reject(err.to_string())),
    };

    node.as_bundle_collection()
        .map(|collection| collection.collection_path().to_string())
        .ok_or_else(|| {
            reject(format!(
                "URL endpoint has to be instance of {BUNDLE_COLLECTION_NAME}"
            ))
        })
}

fn reject<S: Into<String>>(message: S) -> BundleError {
    let err = BundleError::forbidden(message);
    tracing::warn!(error = %err, "rejected bundle");
    err
}
