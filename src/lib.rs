//! Dev server middleware with hot reload.
//!
//! Loads every file matching a set of glob patterns as one handler, chains
//! them in path order in front of a host axum router, and keeps that chain in
//! sync with the files on disk while the server runs.

// Core
pub mod discovery;
pub mod loader;
pub mod pipeline;
pub mod routing;
pub mod watcher;

// Integration
pub mod defaults;
pub mod http;
pub mod plugin;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::DevConfig;
pub use error::{Error, Result};
pub use http::DevServer;
pub use lifecycle::Shutdown;
pub use plugin::{DevMiddleware, Options, StartupError, WatchHandle};
