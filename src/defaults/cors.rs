//! Permissive CORS for local development, on tower-http's `CorsLayer`.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};

use crate::pipeline::{DispatchError, Handler, LayerHandler, Next};

/// Allows any origin and answers every `OPTIONS` request directly with `204`.
#[derive(Debug, Clone)]
pub struct Cors {
    inner: LayerHandler<CorsLayer>,
}

impl Cors {
    pub fn new() -> Self {
        let layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ])
            .allow_headers(AllowHeaders::mirror_request());
        Self {
            inner: LayerHandler::new(layer),
        }
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for Cors {
    async fn handle(&self, req: Request<Body>, next: Next) -> Result<Response, DispatchError> {
        // CorsLayer answers OPTIONS itself with an empty 200
        let options = req.method() == Method::OPTIONS;
        let mut response = self.inner.handle(req, next).await?;
        if options {
            *response.status_mut() = StatusCode::NO_CONTENT;
        }
        Ok(response)
    }
}
