//! Run tower layers as pipeline handlers.
//!
//! The layer wraps a [`Continue`] service that forwards to the rest of the
//! chain, so anything written against `tower::Layer` (tower-http's CORS,
//! header setters, ...) can sit in the pipeline next to loaded handlers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use tower::{Layer, Service, ServiceExt};

use crate::pipeline::{DispatchError, Handler, Next, SharedHandler};

/// Inner service handed to a layer: calls the rest of the chain once.
pub struct Continue {
    next: Option<Next>,
}

impl Continue {
    pub fn new(next: Next) -> Self {
        Self { next: Some(next) }
    }
}

impl Service<Request<Body>> for Continue {
    type Response = Response;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        match self.next.take() {
            Some(next) => Box::pin(next.run(req)),
            None => Box::pin(async { Err(DispatchError::failed("chain continued twice")) }),
        }
    }
}

/// A [`Handler`] backed by a tower layer.
#[derive(Debug, Clone)]
pub struct LayerHandler<L> {
    layer: L,
}

impl<L> LayerHandler<L> {
    pub fn new(layer: L) -> Self {
        Self { layer }
    }
}

#[async_trait]
impl<L> Handler for LayerHandler<L>
where
    L: Layer<Continue> + Send + Sync + 'static,
    L::Service: Service<Request<Body>, Response = Response, Error = DispatchError> + Send,
    <L::Service as Service<Request<Body>>>::Future: Send,
{
    async fn handle(&self, req: Request<Body>, next: Next) -> Result<Response, DispatchError> {
        self.layer.layer(Continue::new(next)).oneshot(req).await
    }
}

/// Wrap a tower layer as a shareable handler.
pub fn from_layer<L>(layer: L) -> SharedHandler
where
    L: Layer<Continue> + Send + Sync + 'static,
    L::Service: Service<Request<Body>, Response = Response, Error = DispatchError> + Send,
    <L::Service as Service<Request<Body>>>::Future: Send,
{
    Arc::new(LayerHandler::new(layer))
}
