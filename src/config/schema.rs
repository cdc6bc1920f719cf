//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::Patterns;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "dev-middleware.toml";

/// Root configuration for the dev server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevConfig {
    /// Listener and host chain settings.
    pub server: ServerConfig,

    /// Which files to load and where to mount them.
    pub middleware: MiddlewareConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Host server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5173").
    pub bind_address: String,

    /// Directory served for requests no middleware answers.
    pub static_dir: Option<PathBuf>,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5173".to_string(),
            static_dir: None,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Middleware discovery and mounting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Glob pattern or list of patterns, relative to the working directory.
    pub files: Patterns,

    /// URL prefix the pipeline is mounted under.
    pub prefix_url: String,

    /// Run the built-in CORS, JSON body and no-cache handlers first.
    pub default_middlewares: bool,

    /// Quiet period before a file event is applied.
    pub debounce_ms: u64,

    /// Refuse to start when no middleware loads.
    pub fail_on_empty: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            files: Patterns::from("middleware/**/*.toml"),
            prefix_url: "/".to_string(),
            default_middlewares: true,
            debounce_ms: 50,
            fail_on_empty: false,
        }
    }
}

impl MiddlewareConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
