//! Envelope-level errors and their HTTP responses.
//!
//! A [`BundleError`] aborts the whole bundle: the client receives a single
//! rejection and never a partial multipart body. Failures of individual
//! sub-requests are not errors at this level; they travel inside the
//! assembled response as [`SubOutcome`](crate::SubOutcome)s.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Duration;

use dav_bundle_core::BoundaryError;

/// Errors that reject a bundle as a whole.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    /// A precondition failed. The message is part of the protocol contract.
    #[error("{0}")]
    Forbidden(String),

    /// The bundle target does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The bundle did not finish before the configured deadline.
    #[error("bundle did not complete within {0:?}")]
    Timeout(Duration),

    /// The resource tree failed as a whole.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BundleError {
    /// Create a forbidden error.
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden(message.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BundleError::Forbidden(_) => StatusCode::FORBIDDEN,
            BundleError::NotFound(_) => StatusCode::NOT_FOUND,
            BundleError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            BundleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Exception name reported in the response body.
    pub fn exception(&self) -> &'static str {
        match self {
            BundleError::Forbidden(_) => "Forbidden",
            BundleError::NotFound(_) => "NotFound",
            BundleError::Timeout(_) => "GatewayTimeout",
            BundleError::Internal(_) => "InternalServerError",
        }
    }

    /// Message shown to the client.
    ///
    /// Internal details are never exposed.
    pub fn client_message(&self) -> String {
        match self {
            BundleError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<BoundaryError> for BundleError {
    fn from(err: BoundaryError) -> Self {
        BundleError::Forbidden(err.to_string())
    }
}

/// JSON body of a rejected bundle.
#[derive(Serialize)]
struct ErrorResponseBody {
    exception: &'static str,
    message: String,
}

impl IntoResponse for BundleError {
    fn into_response(self) -> Response {
        if let BundleError::Internal(detail) = &self {
            tracing::error!(error = %detail, "bundle failed");
        }

        let body = ErrorResponseBody {
            exception: self.exception(),
            message: self.client_message(),
        };
        let mut response = (self.status_code(), Json(body)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
