//! Example 2: In-process bundle round trip
//!
//! Builds a bundle with the client-side builder, sends it through the
//! router without opening a socket, and prints each outcome.
//!
//! Run with: cargo run --bin bundle-roundtrip

use axum::body::Body;
use dav_bundle::BundleServiceBuilder;
use dav_bundle_core::{BundleBuilder, SubRequest, parse_response};
use dav_bundle_examples::{DEMO_HOME, demo_tree, init_tracing};
use http::{HeaderValue, Method, Request, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app = BundleServiceBuilder::new(demo_tree()).build();

    let bundle = BundleBuilder::new()
        .add(SubRequest::new(Method::from_bytes(b"MKCOL")?, "/notes"))?
        .add(
            SubRequest::new(Method::PUT, "/notes/todo.txt")
                .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
                .with_content_id(HeaderValue::from_static("todo"))
                .with_body("buy milk\n"),
        )?
        .add(SubRequest::new(Method::GET, "/notes/todo.txt"))?
        .add(SubRequest::new(Method::GET, "/private/diary.txt"))?
        .add(SubRequest::new(Method::DELETE, "/missing.txt"))?
        .add(SubRequest::new(Method::from_bytes(b"PROPFIND")?, "/notes"))?
        .build();

    let request = Request::builder()
        .method(Method::POST)
        .uri(DEMO_HOME)
        .header(header::CONTENT_TYPE, bundle.content_type())
        .body(Body::from(bundle.body))?;

    let response = app.oneshot(request).await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await?.to_bytes();

    println!("=== Example 2: In-process bundle round trip ===");
    println!("Envelope status: {status}");
    if !status.is_success() {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    let parsed = parse_response(content_type.as_deref(), &body)?;
    for (index, outcome) in parsed.outcomes.iter().enumerate() {
        let id = outcome
            .content_id
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        println!(
            "part {index} [{id}]: {} ({} bytes)",
            outcome.status,
            outcome.body.len()
        );
    }
    Ok(())
}
