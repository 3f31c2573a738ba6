//! Example 1: Bundling file server
//!
//! Serves an in-memory tree with one home collection at `/files/alice`.
//! Every `POST` carrying a `multipart/related` body is treated as a bundle.
//!
//! Run with: cargo run --bin bundle-server
//! Set `PORT` to change the port and `RUST_LOG` to change log output.

use std::time::Duration;

use dav_bundle::BundleServiceBuilder;
use dav_bundle_examples::{DEMO_HOME, demo_tree, init_tracing, server_addr};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app = BundleServiceBuilder::new(demo_tree())
        .concurrency(4)
        .timeout(Duration::from_secs(30))
        .trace(true)
        .build();

    let addr = server_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("=== Example 1: Bundling file server ===");
    println!("Server listening on http://{}", addr);
    println!();
    println!("Bundle collection: {DEMO_HOME}");
    println!();
    println!("Test with:");
    let part = "--b\\r\\nX-Bundle-Request: GET /readme.txt\\r\\n\\r\\n--b--\\r\\n";
    println!("  printf -- '{part}' | \\");
    println!("  curl -X POST http://localhost:{}{DEMO_HOME} \\", addr.port());
    println!("    -H 'Content-Type: multipart/related; boundary=b' \\");
    println!("    --data-binary @-");

    axum::serve(listener, app).await?;
    Ok(())
}
