//! Test doubles shared by the unit tests of the pipeline, watcher and defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use tokio::sync::Notify;
use tower::ServiceExt;

use crate::loader::{HandlerLoader, LoadError};
use crate::pipeline::{entry_point, handler_fn, EntryPoint, Next, PipelineRegistry, SharedHandler};

pub const TRACE: &str = "x-trace";

/// Pauses a load until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Clone)]
enum Behavior {
    Handler(SharedHandler),
    Fail,
    Gated(Arc<Gate>, SharedHandler),
}

/// Loader whose result per path is set by the test.
#[derive(Default)]
pub struct StubLoader {
    behaviors: Mutex<HashMap<PathBuf, Behavior>>,
}

impl StubLoader {
    pub fn set_handler(&self, path: impl Into<PathBuf>, handler: SharedHandler) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(path.into(), Behavior::Handler(handler));
    }

    /// A call-through handler that records `label` on the request.
    pub fn set_tracing(&self, path: impl Into<PathBuf>, label: &str) {
        self.set_handler(path, tracing_handler(label));
    }

    pub fn set_failing(&self, path: impl Into<PathBuf>) {
        self.behaviors.lock().unwrap().insert(path.into(), Behavior::Fail);
    }

    pub fn gate(&self, path: impl Into<PathBuf>, label: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.behaviors.lock().unwrap().insert(
            path.into(),
            Behavior::Gated(gate.clone(), tracing_handler(label)),
        );
        gate
    }
}

#[async_trait]
impl HandlerLoader for StubLoader {
    async fn load(&self, path: &Path) -> Result<SharedHandler, LoadError> {
        let behavior = self.behaviors.lock().unwrap().get(path).cloned();
        match behavior {
            Some(Behavior::Handler(handler)) => Ok(handler),
            Some(Behavior::Gated(gate, handler)) => {
                gate.entered.notify_one();
                gate.release.notified().await;
                Ok(handler)
            }
            Some(Behavior::Fail) => Err(LoadError::Parse {
                path: path.to_path_buf(),
                message: "stub failure".to_string(),
            }),
            None => Err(LoadError::Io {
                path: path.to_path_buf(),
                source: std::io::ErrorKind::NotFound.into(),
            }),
        }
    }
}

/// Appends `label` to the request's trace header and calls through.
pub fn tracing_handler(label: &str) -> SharedHandler {
    let label = label.to_string();
    handler_fn(move |mut req: Request<Body>, next: Next| {
        let value = label.parse().unwrap();
        async move {
            req.headers_mut().append(TRACE, value);
            next.run(req).await
        }
    })
}

/// Host chain ending: 404 echoing the trace header of the request.
async fn fallback(req: Request<Body>) -> Response {
    let mut response = (StatusCode::NOT_FOUND, "host fallback").into_response();
    for value in req.headers().get_all(TRACE) {
        response.headers_mut().append(TRACE, value.clone());
    }
    response
}

/// A host router with the entry point mounted at `prefix`.
pub fn mounted(registry: Arc<PipelineRegistry>, prefix: &str) -> Router {
    Router::new()
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(
            EntryPoint::new(registry, prefix),
            entry_point,
        ))
}

/// Send a GET and return (status, body, trace values).
pub async fn get(app: Router, uri: &str) -> (u16, String, Vec<String>) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn send(app: Router, req: Request<Body>) -> (u16, String, Vec<String>) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status().as_u16();
    let trace = response
        .headers()
        .get_all(TRACE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), trace)
}
