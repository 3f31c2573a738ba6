use std::net::{AddrParseError, SocketAddr};

use dav_bundle::MemoryTree;
use tracing_subscriber::EnvFilter;

/// Home collection served by the examples.
pub const DEMO_HOME: &str = "/files/alice";

/// Returns the server address from PORT env var, defaulting to 3000.
///
/// # Example
///
/// ```ignore
/// let addr = dav_bundle_examples::server_addr()?;
/// let listener = tokio::net::TcpListener::bind(addr).await?;
/// ```
pub fn server_addr() -> Result<SocketAddr, AddrParseError> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    format!("0.0.0.0:{port}").parse()
}

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to debug
/// output for the bundling crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dav_bundle=debug,tower_http=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// A tree with one home collection and a few files in it.
pub fn demo_tree() -> MemoryTree {
    MemoryTree::new()
        .with_home(DEMO_HOME)
        .with_file("/files/alice/readme.txt", "Welcome to the bundle demo.\n")
        .with_file("/files/alice/photos/cat.jpg", vec![0xffu8, 0xd8, 0xff, 0xe0])
        .with_denied("/files/alice/private")
}
