//! Axum handler for bundle requests.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use dav_bundle_core::BundleResponse;

use crate::endpoint::{BundleEngine, BundleEnvelope};
use crate::error::BundleError;
use crate::tree::ResourceTree;

/// Router state: the tree plus the engine serving it.
pub struct BundleState<T> {
    pub tree: Arc<T>,
    pub engine: Arc<BundleEngine>,
}

// Manual impl: `T` itself need not be `Clone`.
impl<T> Clone for BundleState<T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            engine: self.engine.clone(),
        }
    }
}

/// Handle a `POST` of a bundle to any path.
pub async fn bundle_handler<T>(State(state): State<BundleState<T>>, request: Request) -> Response
where
    T: ResourceTree + 'static,
{
    let envelope = BundleEnvelope::from_request(request);
    match state.engine.handle_bundle(state.tree.as_ref(), envelope).await {
        Ok(bundle) => bundle_response(bundle),
        Err(err) => err.into_response(),
    }
}

/// Render an assembled bundle as a `200 OK` multipart response.
pub fn bundle_response(bundle: BundleResponse) -> Response {
    let content_type = match HeaderValue::from_str(&bundle.content_type()) {
        Ok(value) => value,
        Err(err) => {
            return BundleError::internal(format!("invalid response content type: {err}"))
                .into_response();
        }
    };
    let body = bundle.encode();
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}
