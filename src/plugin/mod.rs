//! Bootstrap: wire the pipeline into a host router and keep it in sync with disk.
//!
//! # Startup order
//! ```text
//! install(router)      entry point mounted, empty pipeline falls through
//! start(shutdown)
//!     → locate patterns (fatal on invalid glob)
//!     → start notify on the pattern roots
//!     → populate (concurrent loads)
//!     → spawn WatchCoordinator
//! ```
//!
//! The watcher starts before the initial populate so an edit made while the
//! first loads run is still delivered.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::MiddlewareConfig;
use crate::defaults;
use crate::discovery::{locate, watch_roots, LocatorError, Patterns};
use crate::loader::{HandlerLoader, ManifestLoader};
use crate::pipeline::{entry_point, EntryPoint, PipelineRegistry, PopulateReport, SharedHandler};
use crate::watcher::{FsWatcher, WatchCoordinator};

/// Errors that stop [`DevMiddleware::start`].
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error("failed to watch middleware files: {0}")]
    Watch(#[from] notify::Error),

    #[error("no middleware loaded from {patterns:?}")]
    NoMiddleware { patterns: Vec<String> },
}

/// Integrator options.
#[derive(Clone)]
pub struct Options {
    /// Glob patterns selecting the middleware files.
    pub middleware_files: Patterns,

    /// Requests outside this prefix never reach the pipeline.
    pub prefix_url: String,

    /// Replaces the built-in defaults when set; an empty list disables them.
    pub default_middlewares: Option<Vec<SharedHandler>>,

    /// Base directory for relative patterns.
    pub cwd: PathBuf,

    pub debounce: Duration,

    /// Fail startup when nothing loads.
    pub fail_on_empty: bool,
}

impl Options {
    pub fn new(middleware_files: impl Into<Patterns>) -> Self {
        Self {
            middleware_files: middleware_files.into(),
            prefix_url: "/".to_string(),
            default_middlewares: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            debounce: Duration::from_millis(50),
            fail_on_empty: false,
        }
    }

    /// Options from the `[middleware]` config table, resolved against `cwd`.
    pub fn from_config(config: &MiddlewareConfig, cwd: impl Into<PathBuf>) -> Self {
        Self {
            middleware_files: config.files.clone(),
            prefix_url: config.prefix_url.clone(),
            default_middlewares: (!config.default_middlewares).then(Vec::new),
            cwd: cwd.into(),
            debounce: config.debounce(),
            fail_on_empty: config.fail_on_empty,
        }
    }

    pub fn prefix_url(mut self, prefix_url: impl Into<String>) -> Self {
        self.prefix_url = prefix_url.into();
        self
    }

    pub fn default_middlewares(mut self, handlers: Vec<SharedHandler>) -> Self {
        self.default_middlewares = Some(handlers);
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn fail_on_empty(mut self, fail_on_empty: bool) -> Self {
        self.fail_on_empty = fail_on_empty;
        self
    }
}

/// Keeps the file watcher alive and owns the coordinator task.
///
/// Dropping the handle drops the watcher, which closes the event channel and
/// ends the coordinator.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    report: PopulateReport,
}

impl WatchHandle {
    /// Result of the initial population.
    pub fn report(&self) -> &PopulateReport {
        &self.report
    }

    /// Wait for the coordinator to exit (after shutdown is triggered).
    pub async fn join(self) {
        let WatchHandle { _watcher, task, .. } = self;
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Watch coordinator task failed");
        }
    }
}

/// Hot-reloaded middleware for one host server.
pub struct DevMiddleware {
    options: Options,
    registry: Arc<PipelineRegistry>,
    installed: AtomicBool,
}

impl DevMiddleware {
    pub fn new(options: Options, loader: Arc<dyn HandlerLoader>) -> Self {
        let defaults = options
            .default_middlewares
            .clone()
            .unwrap_or_else(defaults::builtin);
        let registry = Arc::new(PipelineRegistry::new(loader, defaults));
        Self {
            options,
            registry,
            installed: AtomicBool::new(false),
        }
    }

    /// Use the declarative manifest loader.
    pub fn with_manifest_loader(options: Options) -> Self {
        Self::new(options, Arc::new(ManifestLoader::new()))
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    /// Add the entry point to `router`. Only the first call has an effect.
    pub fn install<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        if self.installed.swap(true, Ordering::SeqCst) {
            tracing::warn!("Middleware entry point already installed, ignoring");
            return router;
        }
        tracing::debug!(prefix = %self.options.prefix_url, "Installing middleware entry point");
        router.layer(middleware::from_fn_with_state(
            EntryPoint::new(self.registry.clone(), &self.options.prefix_url),
            entry_point,
        ))
    }

    /// Locate and load every middleware file, then keep watching until `shutdown`.
    pub async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<WatchHandle, StartupError> {
        let options = &self.options;
        let watched = locate(&options.middleware_files, &options.cwd)?;
        if watched.is_empty() {
            tracing::warn!(
                patterns = ?options.middleware_files.iter().collect::<Vec<_>>(),
                "No middleware files matched"
            );
        }

        let (fs_watcher, events) = FsWatcher::new(watch_roots(&options.middleware_files, &options.cwd));
        let watcher = fs_watcher.run()?;

        let report = self.registry.populate(&watched).await;
        if options.fail_on_empty && report.installed() == 0 {
            return Err(StartupError::NoMiddleware {
                patterns: options.middleware_files.iter().map(str::to_string).collect(),
            });
        }

        let coordinator = WatchCoordinator::new(
            self.registry.clone(),
            options.middleware_files.clone(),
            options.cwd.clone(),
            watched,
            options.debounce,
        );
        let task = tokio::spawn(coordinator.run(events, shutdown));

        Ok(WatchHandle {
            _watcher: watcher,
            task,
            report,
        })
    }
}
