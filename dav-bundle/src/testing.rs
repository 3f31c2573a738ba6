//! Shared test fixtures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, header};
use bytes::Bytes;
use futures::stream;

use dav_bundle_core::EncodedBundle;

use crate::tree::{MemoryNode, MemoryTree, ResourceTree, TreeError};

/// A [`MemoryTree`] that counts calls and can inject faults.
pub(crate) struct CountingTree {
    pub inner: MemoryTree,
    pub resolves: AtomicUsize,
    pub executes: AtomicUsize,
    fail_executes: AtomicBool,
    delay: Option<Duration>,
}

impl CountingTree {
    /// `/files/alice` is a home holding `notes.txt`.
    pub fn new() -> Self {
        Self::around(
            MemoryTree::new()
                .with_home("/files/alice")
                .with_file("/files/alice/notes.txt", "hello"),
        )
    }

    pub fn around(inner: MemoryTree) -> Self {
        Self {
            inner,
            resolves: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            fail_executes: AtomicBool::new(false),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every `execute` fail with a fatal fault.
    pub fn fail_executes(&self) {
        self.fail_executes.store(true, Ordering::SeqCst);
    }
}

impl ResourceTree for CountingTree {
    type Node = MemoryNode;

    async fn resolve(&self, path: &str) -> Result<MemoryNode, TreeError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(path).await
    }

    async fn execute(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TreeError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_executes.load(Ordering::SeqCst) {
            return Err(TreeError::Unavailable("injected".into()));
        }
        self.inner.execute(request).await
    }
}

/// A body that records whether it was ever polled.
pub(crate) fn tracked_body(contents: &'static str) -> (Body, Arc<AtomicBool>) {
    let polled = Arc::new(AtomicBool::new(false));
    let flag = polled.clone();
    let body = Body::from_stream(stream::once(async move {
        flag.store(true, Ordering::SeqCst);
        Ok::<_, std::convert::Infallible>(Bytes::from_static(contents.as_bytes()))
    }));
    (body, polled)
}

/// A body that yields `prefix` and then fails like a dropped connection.
pub(crate) fn broken_body(prefix: &'static str) -> Body {
    Body::from_stream(stream::iter([
        Ok(Bytes::from_static(prefix.as_bytes())),
        Err(std::io::Error::other("connection reset")),
    ]))
}

/// `Content-Type` headers announcing `bundle`.
pub(crate) fn bundle_headers(bundle: &EncodedBundle) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&bundle.content_type()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers
}
