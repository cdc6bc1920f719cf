//! The single middleware installed into the host router.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::pipeline::registry::PipelineRegistry;
use crate::routing::PathPrefixMatcher;

/// State captured by the entry point: the registry and the mount prefix.
#[derive(Clone)]
pub struct EntryPoint {
    registry: Arc<PipelineRegistry>,
    mount: Arc<PathPrefixMatcher>,
}

impl EntryPoint {
    pub fn new(registry: Arc<PipelineRegistry>, prefix_url: &str) -> Self {
        Self {
            registry,
            mount: Arc::new(PathPrefixMatcher::new(prefix_url)),
        }
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }
}

/// Route requests under the mount prefix through the live pipeline; pass
/// everything else straight to the host chain.
pub async fn entry_point(
    State(entry): State<EntryPoint>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !entry.mount.matches_path(req.uri().path()) {
        return next.run(req).await;
    }
    entry.registry.dispatch(req, next).await
}
