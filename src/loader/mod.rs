//! Handler loading.
//!
//! # Data Flow
//! ```text
//! absolute path
//!     → HandlerLoader::load (fresh read, never cached)
//!     → manifest.rs (parse TOML/JSON, compile matchers and canned response)
//!     → Arc<dyn Handler>
//! ```
//!
//! # Design Decisions
//! - Loading is an injected capability; the registry only sees the trait
//! - Every call re-reads the file so reloads always observe current contents
//! - A failed load never touches shared state

pub mod manifest;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::pipeline::SharedHandler;

pub use manifest::{HandlerManifest, ManifestHandler, ManifestFormat, ManifestLoader};

/// Turns a middleware file into a handler.
#[async_trait]
pub trait HandlerLoader: Send + Sync + 'static {
    /// Load the handler defined by `path` as it is on disk right now.
    async fn load(&self, path: &Path) -> Result<SharedHandler, LoadError>;
}

/// Errors raised while loading one middleware file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unsupported middleware file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid handler in {}: {message}", path.display())]
    InvalidHandler { path: PathBuf, message: String },
}

impl LoadError {
    /// The file that failed to load.
    pub fn path(&self) -> &Path {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::UnsupportedFormat { path }
            | LoadError::InvalidHandler { path, .. } => path,
        }
    }
}
