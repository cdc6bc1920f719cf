//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const TRACE: &str = "x-trace";

/// A temporary project directory holding middleware files.
pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Canonical project root, matching what the locator reports.
    pub fn path(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    /// Write `content` to `name` (relative), creating parent directories.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.path().join(name)).unwrap();
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }
}

/// Manifest that calls through and tags the response with `label`.
pub fn tag_manifest(label: &str) -> String {
    format!("[headers]\n{TRACE} = \"{label}\"\n")
}

/// Manifest answering `path` with a text body.
pub fn respond_manifest(path: &str, body: &str) -> String {
    format!("[match]\npath = \"{path}\"\n\n[respond]\nbody = \"{body}\"\n")
}

/// Host chain ending used behind the entry point.
pub fn host() -> Router {
    Router::new().fallback(|| async { (StatusCode::NOT_FOUND, "host fallback").into_response() })
}

/// Send a request and return (status, body, trace tags in handler order).
///
/// Call-through manifests tag responses on the way out, so the innermost
/// handler's tag comes first; it is reversed here.
pub async fn send(app: Router, req: Request<Body>) -> (u16, String, Vec<String>) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status().as_u16();
    let mut trace: Vec<String> = response
        .headers()
        .get_all(TRACE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    trace.reverse();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), trace)
}

pub async fn get(app: Router, uri: &str) -> (u16, String, Vec<String>) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
