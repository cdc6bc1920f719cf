//! Disable client caching for everything the pipeline serves.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request},
    response::Response,
};
use tower::{Layer, ServiceExt};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::pipeline::{Continue, DispatchError, Handler, Next};

fn overriding(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl Handler for NoCache {
    async fn handle(&self, req: Request<Body>, next: Next) -> Result<Response, DispatchError> {
        let service = Continue::new(next);
        let service = overriding(header::PRAGMA, "no-cache").layer(service);
        let service = overriding(header::EXPIRES, "-1").layer(service);
        let service = overriding(
            header::CACHE_CONTROL,
            "private, no-cache, no-store, must-revalidate",
        )
        .layer(service);
        service.oneshot(req).await
    }
}
