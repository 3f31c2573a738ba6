//! In-memory resource tree.
//!
//! Collections and files live in one ordered map keyed by normalized
//! absolute path. Home collections carry the bundle capability. Paths are
//! stored exactly as they appear in request URIs, so percent-encoded names
//! stay encoded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{BundleCollection, ResourceTree, TreeError, TreeNode};

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

#[derive(Clone, Debug)]
enum Entry {
    Collection { home: bool },
    File(File),
}

#[derive(Clone, Debug)]
struct File {
    data: Bytes,
    etag: String,
    content_type: HeaderValue,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    denied: BTreeSet<String>,
    next_etag: u64,
}

impl State {
    fn new() -> Self {
        let mut state = Self::default();
        state
            .entries
            .insert("/".to_string(), Entry::Collection { home: false });
        state
    }

    fn next_etag(&mut self) -> String {
        self.next_etag += 1;
        format!("\"{}\"", self.next_etag)
    }

    fn is_denied(&self, path: &str) -> bool {
        self.denied
            .iter()
            .any(|denied| path == denied.as_str() || is_descendant(path, denied))
    }

    fn is_collection(&self, path: &str) -> bool {
        matches!(self.entries.get(path), Some(Entry::Collection { .. }))
    }

    fn ensure_collections(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.entries
                .entry(current.clone())
                .or_insert(Entry::Collection { home: false });
        }
    }

    /// Direct children of the collection at `path`.
    fn children<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Entry)> + 'a {
        self.entries.iter().filter(move |(key, _)| {
            is_descendant(key, path) && !key[prefix_len(path)..].contains('/')
        })
    }
}

/// Thread-safe in-memory resource tree.
///
/// ```
/// use dav_bundle::MemoryTree;
///
/// let tree = MemoryTree::new()
///     .with_home("/files/alice")
///     .with_file("/files/alice/notes.txt", "hello");
/// ```
#[derive(Debug)]
pub struct MemoryTree {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// An empty tree holding only the root collection.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Add a bundle-capable home collection, creating missing parents.
    pub fn with_home(mut self, path: &str) -> Self {
        let path = normalize_unchecked(path);
        let state = self.state.get_mut();
        state.ensure_collections(&path);
        state.entries.insert(path, Entry::Collection { home: true });
        self
    }

    /// Add a file, creating missing parent collections.
    pub fn with_file<B: Into<Bytes>>(mut self, path: &str, data: B) -> Self {
        let path = normalize_unchecked(path);
        let state = self.state.get_mut();
        state.ensure_collections(parent_of(&path));
        let etag = state.next_etag();
        state.entries.insert(
            path,
            Entry::File(File {
                data: data.into(),
                etag,
                content_type: HeaderValue::from_static(DEFAULT_FILE_TYPE),
            }),
        );
        self
    }

    /// Deny every request on `path` and beneath it.
    pub fn with_denied(mut self, path: &str) -> Self {
        self.state.get_mut().denied.insert(normalize_unchecked(path));
        self
    }

    /// Simulate a storage outage; every call fails with [`TreeError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Contents of the file at `path`.
    pub async fn read_file(&self, path: &str) -> Option<Bytes> {
        let path = normalize(path).ok()?;
        match self.state.read().await.entries.get(&path) {
            Some(Entry::File(file)) => Some(file.data.clone()),
            _ => None,
        }
    }

    /// Whether any node exists at `path`.
    pub async fn exists(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(path) => self.state.read().await.entries.contains_key(&path),
            Err(_) => false,
        }
    }

    fn check_available(&self) -> Result<(), TreeError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TreeError::Unavailable("storage is offline".into()));
        }
        Ok(())
    }

    async fn get(&self, path: &str, head: bool) -> Result<http::Response<Bytes>, TreeError> {
        let state = self.state.read().await;
        match state.entries.get(path) {
            Some(Entry::File(file)) => {
                let body = if head { Bytes::new() } else { file.data.clone() };
                let mut response = response(StatusCode::OK, body);
                let headers = response.headers_mut();
                headers.insert(header::CONTENT_TYPE, file.content_type.clone());
                headers.insert(header::ETAG, etag_value(&file.etag));
                Ok(response)
            }
            Some(Entry::Collection { .. }) => {
                let mut listing = String::new();
                for (child, _) in state.children(path) {
                    listing.push_str(&child[prefix_len(path)..]);
                    listing.push('\n');
                }
                let body = if head { Bytes::new() } else { Bytes::from(listing) };
                let mut response = response(StatusCode::OK, body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                Ok(response)
            }
            None => Err(TreeError::NotFound(path.to_string())),
        }
    }

    async fn put(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<http::Response<Bytes>, TreeError> {
        let mut state = self.state.write().await;
        if !state.is_collection(parent_of(path)) {
            return Err(TreeError::Conflict(format!(
                "parent collection of {path} does not exist"
            )));
        }

        let existing = match state.entries.get(path) {
            Some(Entry::Collection { .. }) => {
                return Err(TreeError::MethodNotAllowed(format!(
                    "{path} is a collection"
                )));
            }
            Some(Entry::File(file)) => Some(file.etag.clone()),
            None => None,
        };
        check_preconditions(headers, existing.as_deref(), path)?;

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_FILE_TYPE));
        let etag = state.next_etag();
        state.entries.insert(
            path.to_string(),
            Entry::File(File {
                data: body,
                etag: etag.clone(),
                content_type,
            }),
        );

        let status = if existing.is_some() {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        let mut response = response(status, Bytes::new());
        response
            .headers_mut()
            .insert(header::ETAG, etag_value(&etag));
        Ok(response)
    }

    async fn delete(&self, path: &str) -> Result<http::Response<Bytes>, TreeError> {
        let mut state = self.state.write().await;
        match state.entries.get(path) {
            None => return Err(TreeError::NotFound(path.to_string())),
            Some(Entry::Collection { home: true }) => {
                return Err(TreeError::PermissionDenied(format!(
                    "{path} is a home collection"
                )));
            }
            Some(_) if path == "/" => {
                return Err(TreeError::PermissionDenied("cannot delete the root".into()));
            }
            Some(_) => {}
        }
        if state.entries.iter().any(|(key, entry)| {
            is_descendant(key, path) && matches!(entry, Entry::Collection { home: true })
        }) {
            return Err(TreeError::PermissionDenied(format!(
                "{path} contains a home collection"
            )));
        }

        state
            .entries
            .retain(|key, _| key != path && !is_descendant(key, path));
        Ok(response(StatusCode::NO_CONTENT, Bytes::new()))
    }

    async fn mkcol(&self, path: &str, body: &Bytes) -> Result<http::Response<Bytes>, TreeError> {
        if !body.is_empty() {
            return Err(TreeError::BadRequest("MKCOL does not take a body".into()));
        }
        let mut state = self.state.write().await;
        if state.entries.contains_key(path) {
            return Err(TreeError::MethodNotAllowed(format!("{path} already exists")));
        }
        if !state.is_collection(parent_of(path)) {
            return Err(TreeError::Conflict(format!(
                "parent collection of {path} does not exist"
            )));
        }
        state
            .entries
            .insert(path.to_string(), Entry::Collection { home: false });
        Ok(response(StatusCode::CREATED, Bytes::new()))
    }

    async fn propfind(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<http::Response<Bytes>, TreeError> {
        let depth = match headers.get("depth").map(|v| v.as_bytes()) {
            None | Some(b"1") => 1,
            Some(b"0") => 0,
            Some(b"infinity") => {
                return Err(TreeError::PermissionDenied(
                    "Depth: infinity is not supported".into(),
                ));
            }
            Some(_) => return Err(TreeError::BadRequest("invalid Depth header".into())),
        };

        let state = self.state.read().await;
        let entry = state
            .entries
            .get(path)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;

        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<d:multistatus xmlns:d=\"DAV:\">\n",
        );
        write_propstat(&mut xml, path, entry);
        if depth == 1 {
            for (child, entry) in state.children(path) {
                write_propstat(&mut xml, child, entry);
            }
        }
        xml.push_str("</d:multistatus>\n");

        let mut response = response(StatusCode::MULTI_STATUS, Bytes::from(xml));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml; charset=utf-8"),
        );
        Ok(response)
    }
}

/// A node resolved from a [`MemoryTree`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryNode {
    /// A home collection; accepts bundles.
    Home(HomeCollection),
    Collection(String),
    File(String),
}

/// Bundle capability of a home collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HomeCollection {
    path: String,
}

impl BundleCollection for HomeCollection {
    fn collection_path(&self) -> &str {
        &self.path
    }
}

impl TreeNode for MemoryNode {
    fn as_bundle_collection(&self) -> Option<&dyn BundleCollection> {
        match self {
            MemoryNode::Home(home) => Some(home),
            _ => None,
        }
    }
}

impl ResourceTree for MemoryTree {
    type Node = MemoryNode;

    async fn resolve(&self, path: &str) -> Result<MemoryNode, TreeError> {
        self.check_available()?;
        let path = normalize(path)?;
        let state = self.state.read().await;
        if state.is_denied(&path) {
            return Err(TreeError::PermissionDenied(path));
        }
        match state.entries.get(&path) {
            Some(Entry::Collection { home: true }) => Ok(MemoryNode::Home(HomeCollection { path })),
            Some(Entry::Collection { home: false }) => Ok(MemoryNode::Collection(path)),
            Some(Entry::File(_)) => Ok(MemoryNode::File(path)),
            None => Err(TreeError::NotFound(path)),
        }
    }

    async fn execute(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TreeError> {
        self.check_available()?;
        let (parts, body) = request.into_parts();
        let path = normalize(parts.uri.path())?;
        if self.state.read().await.is_denied(&path) {
            return Err(TreeError::PermissionDenied(path));
        }

        match parts.method.as_str() {
            "GET" => self.get(&path, false).await,
            "HEAD" => self.get(&path, true).await,
            "PUT" => self.put(&path, &parts.headers, body).await,
            "DELETE" => self.delete(&path).await,
            "MKCOL" => self.mkcol(&path, &body).await,
            "PROPFIND" => self.propfind(&path, &parts.headers).await,
            other => Err(TreeError::MethodNotAllowed(format!(
                "{other} is not supported on {path}"
            ))),
        }
    }
}

fn response(status: StatusCode, body: Bytes) -> http::Response<Bytes> {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response
}

fn check_preconditions(
    headers: &HeaderMap,
    current: Option<&str>,
    path: &str,
) -> Result<(), TreeError> {
    if let Some(value) = headers.get(header::IF_NONE_MATCH) {
        if value == "*" && current.is_some() {
            return Err(TreeError::PreconditionFailed(format!("{path} already exists")));
        }
    }
    if let Some(value) = headers.get(header::IF_MATCH) {
        let matches = match current {
            Some(etag) => value == "*" || value.as_bytes() == etag.as_bytes(),
            None => false,
        };
        if !matches {
            return Err(TreeError::PreconditionFailed(format!(
                "{path} does not match If-Match"
            )));
        }
    }
    Ok(())
}

fn etag_value(etag: &str) -> HeaderValue {
    HeaderValue::from_str(etag).unwrap_or_else(|_| HeaderValue::from_static("\"0\""))
}

fn write_propstat(xml: &mut String, path: &str, entry: &Entry) {
    let _ = write!(xml, "<d:response><d:href>{}</d:href><d:propstat><d:prop>", escape(path));
    match entry {
        Entry::Collection { .. } => {
            xml.push_str("<d:resourcetype><d:collection/></d:resourcetype>")
        }
        Entry::File(file) => {
            let _ = write!(
                xml,
                "<d:resourcetype/><d:getcontentlength>{}</d:getcontentlength>\
                 <d:getetag>{}</d:getetag>",
                file.data.len(),
                escape(&file.etag)
            );
        }
    }
    xml.push_str("</d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>\n");
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Normalize an absolute path: collapse empty and `.` segments, drop the
/// trailing slash. `..` segments are rejected.
fn normalize(path: &str) -> Result<String, TreeError> {
    if path.split('/').any(|segment| segment == "..") {
        return Err(TreeError::BadRequest(format!("{path} escapes the tree")));
    }
    Ok(normalize_unchecked(path))
}

fn normalize_unchecked(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn prefix_len(collection: &str) -> usize {
    if collection == "/" {
        1
    } else {
        collection.len() + 1
    }
}

fn is_descendant(path: &str, collection: &str) -> bool {
    if collection == "/" {
        return path != "/";
    }
    path.len() > collection.len() + 1
        && path.starts_with(collection)
        && path.as_bytes()[collection.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn request(method: &str, path: &str, body: &'static str) -> http::Request<Bytes> {
        http::Request::builder()
            .method(Method::from_bytes(method.as_bytes()).unwrap())
            .uri(path)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    fn tree() -> MemoryTree {
        MemoryTree::new()
            .with_home("/files/alice")
            .with_file("/files/alice/notes.txt", "hello")
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("//files/./alice/").unwrap(), "/files/alice");
        assert!(normalize("/files/../etc").is_err());
    }

    #[test]
    fn test_parent_and_descendant() {
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a");
        assert!(is_descendant("/a/b", "/a"));
        assert!(!is_descendant("/ab", "/a"));
        assert!(!is_descendant("/a", "/a"));
        assert!(is_descendant("/a", "/"));
    }

    #[tokio::test]
    async fn test_resolve_home_has_capability() {
        let tree = tree();
        let home = tree.resolve("/files/alice/").await.unwrap();
        let collection = home.as_bundle_collection().unwrap();
        assert_eq!(collection.collection_path(), "/files/alice");

        let plain = tree.resolve("/files").await.unwrap();
        assert!(plain.as_bundle_collection().is_none());

        let file = tree.resolve("/files/alice/notes.txt").await.unwrap();
        assert_eq!(file, MemoryNode::File("/files/alice/notes.txt".into()));
    }

    #[tokio::test]
    async fn test_resolve_missing_and_denied() {
        let tree = tree().with_denied("/files/alice/private");
        assert_eq!(
            tree.resolve("/nope").await.unwrap_err(),
            TreeError::NotFound("/nope".into())
        );
        assert!(matches!(
            tree.resolve("/files/alice/private/x").await.unwrap_err(),
            TreeError::PermissionDenied(_)
        ));
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let tree = tree();
        let created = tree
            .execute(request("PUT", "/files/alice/new.txt", "data"))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert!(created.headers().contains_key(header::ETAG));

        let replaced = tree
            .execute(request("PUT", "/files/alice/new.txt", "more"))
            .await
            .unwrap();
        assert_eq!(replaced.status(), StatusCode::NO_CONTENT);

        let got = tree
            .execute(request("GET", "/files/alice/new.txt", ""))
            .await
            .unwrap();
        assert_eq!(got.status(), StatusCode::OK);
        assert_eq!(&got.body()[..], b"more");

        let head = tree
            .execute(request("HEAD", "/files/alice/new.txt", ""))
            .await
            .unwrap();
        assert!(head.body().is_empty());
    }

    #[tokio::test]
    async fn test_put_without_parent_conflicts() {
        let err = tree()
            .execute(request("PUT", "/files/alice/missing/a.txt", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_put_if_none_match() {
        let tree = tree();
        let mut req = request("PUT", "/files/alice/notes.txt", "x");
        req.headers_mut()
            .insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        let err = tree.execute(req).await.unwrap_err();
        assert!(matches!(err, TreeError::PreconditionFailed(_)));
        assert_eq!(tree.read_file("/files/alice/notes.txt").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_mkcol_and_delete() {
        let tree = tree();
        let created = tree
            .execute(request("MKCOL", "/files/alice/docs", ""))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);

        let again = tree
            .execute(request("MKCOL", "/files/alice/docs", ""))
            .await
            .unwrap_err();
        assert!(matches!(again, TreeError::MethodNotAllowed(_)));

        tree.execute(request("PUT", "/files/alice/docs/a.txt", "a"))
            .await
            .unwrap();
        let deleted = tree
            .execute(request("DELETE", "/files/alice/docs", ""))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        assert!(!tree.exists("/files/alice/docs/a.txt").await);
        assert!(tree.exists("/files/alice/notes.txt").await);
    }

    #[tokio::test]
    async fn test_delete_home_denied() {
        let tree = tree();
        let err = tree
            .execute(request("DELETE", "/files/alice", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::PermissionDenied(_)));
        let err = tree.execute(request("DELETE", "/files", "")).await.unwrap_err();
        assert!(matches!(err, TreeError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_propfind_depth() {
        let tree = tree();
        let mut req = request("PROPFIND", "/files/alice", "");
        req.headers_mut().insert("depth", HeaderValue::from_static("1"));
        let response = tree.execute(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        let xml = std::str::from_utf8(response.body()).unwrap();
        assert!(xml.contains("<d:href>/files/alice</d:href>"));
        assert!(xml.contains("<d:href>/files/alice/notes.txt</d:href>"));
        assert!(xml.contains("<d:getcontentlength>5</d:getcontentlength>"));

        let mut req = request("PROPFIND", "/files/alice", "");
        req.headers_mut().insert("depth", HeaderValue::from_static("0"));
        let response = tree.execute(req).await.unwrap();
        let xml = std::str::from_utf8(response.body()).unwrap();
        assert!(!xml.contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let err = tree()
            .execute(request("PATCH", "/files/alice/notes.txt", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::MethodNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let tree = tree();
        tree.set_unavailable(true);
        assert!(tree.resolve("/files/alice").await.unwrap_err().is_fatal());
        assert!(
            tree.execute(request("GET", "/files/alice/notes.txt", ""))
                .await
                .unwrap_err()
                .is_fatal()
        );
    }
}
