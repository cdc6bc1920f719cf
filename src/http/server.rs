//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the host Router (static directory or plain 404)
//! - Mount the hot-reloaded pipeline in front of it
//! - Wire up middleware (tracing, timeout, request ID)
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::plugin::DevMiddleware;

pub const X_REQUEST_ID: &str = "x-request-id";

/// The dev server: host chain plus mounted middleware.
pub struct DevServer {
    router: Router,
}

impl DevServer {
    pub fn new(config: &ServerConfig, middleware: &DevMiddleware) -> Self {
        Self {
            router: Self::build_router(config, middleware),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, middleware: &DevMiddleware) -> Router {
        let host = match &config.static_dir {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "Serving static files");
                Router::new().fallback_service(ServeDir::new(dir))
            }
            None => Router::new().fallback(not_found),
        };

        middleware
            .install(host)
            .layer(TimeoutLayer::new(config.request_timeout()))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    tracing::debug!(path = %uri.path(), "No middleware answered");
    (StatusCode::NOT_FOUND, format!("Cannot {}", uri.path()))
}
