//! The chained-middleware contract.
//!
//! A handler receives the request and a [`Next`] continuation. It either
//! returns a response, terminating the chain, or calls `next.run(req)` to hand
//! the request to the following handler. The last link of every chain is the
//! host router's own `axum::middleware::Next`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use thiserror::Error;

use crate::pipeline::registry::Pipeline;

/// A request handler mounted into the pipeline.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: Request<Body>, next: Next) -> Result<Response, DispatchError>;
}

/// Shared, type-erased handler.
pub type SharedHandler = Arc<dyn Handler>;

/// A handler failed while serving one request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("middleware {handler} failed: {message}")]
    Failed { handler: String, message: String },

    #[error("middleware {handler} panicked")]
    Panicked { handler: String },
}

impl DispatchError {
    /// Failure raised from inside a handler. The chain fills in which handler it was.
    pub fn failed(message: impl Into<String>) -> Self {
        DispatchError::Failed {
            handler: String::new(),
            message: message.into(),
        }
    }

    pub(crate) fn attribute(mut self, label: &str) -> Self {
        if let DispatchError::Failed { handler, .. } = &mut self {
            if handler.is_empty() {
                *handler = label.to_string();
            }
        }
        self
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Middleware failure").into_response()
    }
}

/// Continuation handed to each handler.
///
/// Owns the snapshot being dispatched, so a pipeline swap in the middle of a
/// request never changes what the rest of this request sees.
pub struct Next {
    defaults: Arc<Vec<SharedHandler>>,
    pipeline: Arc<Pipeline>,
    position: usize,
    host: middleware::Next,
}

impl Next {
    pub(crate) fn new(
        defaults: Arc<Vec<SharedHandler>>,
        pipeline: Arc<Pipeline>,
        host: middleware::Next,
    ) -> Self {
        Self {
            defaults,
            pipeline,
            position: 0,
            host,
        }
    }

    /// Run the rest of the chain.
    pub async fn run(self, req: Request<Body>) -> Result<Response, DispatchError> {
        let Next {
            defaults,
            pipeline,
            position,
            host,
        } = self;

        let (handler, label) = if let Some(handler) = defaults.get(position) {
            (handler.clone(), format!("default #{position}"))
        } else if let Some(entry) = pipeline.entries().get(position - defaults.len()) {
            (entry.handler().clone(), entry.path().display().to_string())
        } else {
            return Ok(host.run(req).await);
        };

        let next = Next {
            defaults,
            pipeline,
            position: position + 1,
            host,
        };

        match AssertUnwindSafe(handler.handle(req, next)).catch_unwind().await {
            Ok(result) => result.map_err(|e| e.attribute(&label)),
            Err(_) => Err(DispatchError::Panicked { handler: label }),
        }
    }
}

struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, DispatchError>> + Send + 'static,
{
    async fn handle(&self, req: Request<Body>, next: Next) -> Result<Response, DispatchError> {
        (self.0)(req, next).await
    }
}

/// Wrap a closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Request<Body>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, DispatchError>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}
