//! The live pipeline and the operations that change it.
//!
//! # State per entry
//! ```text
//! Unloaded → Loaded → Reloading → Loaded | Failed
//! Failed keeps the last good handler; a later successful reload returns to Loaded.
//! ```
//!
//! # Design Decisions
//! - Rebuild-and-swap: every change builds a new immutable [`Pipeline`] and
//!   stores it into an `ArcSwap` in one step
//! - Loads run outside the install lock; only the read-build-store step is serialized
//! - Every load draws a ticket before it starts; an install never overwrites
//!   an entry carrying a newer ticket
//! - A populate also draws a ticket; a reload that started before it cannot
//!   bring back a path that populate left out

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{body::Body, http::Request, middleware, response::{IntoResponse, Response}};
use dashmap::DashMap;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::loader::{HandlerLoader, LoadError};
use crate::observability::metrics;
use crate::pipeline::handler::{DispatchError, Next, SharedHandler};

/// One loaded middleware file.
#[derive(Clone)]
pub struct HandlerEntry {
    path: PathBuf,
    handler: SharedHandler,
    loaded_at_version: u64,
}

impl HandlerEntry {
    pub fn new(path: PathBuf, handler: SharedHandler, loaded_at_version: u64) -> Self {
        Self {
            path,
            handler,
            loaded_at_version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    /// Ticket of the load that produced this handler.
    pub fn loaded_at_version(&self) -> u64 {
        self.loaded_at_version
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("path", &self.path)
            .field("loaded_at_version", &self.loaded_at_version)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the installed handlers, sorted by path.
#[derive(Debug, Default)]
pub struct Pipeline {
    generation: u64,
    entries: Vec<HandlerEntry>,
}

impl Pipeline {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Incremented by every install.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[HandlerEntry] {
        &self.entries
    }

    pub fn get(&self, path: &Path) -> Option<&HandlerEntry> {
        self.position(path).ok().map(|i| &self.entries[i])
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(HandlerEntry::path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, path: &Path) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.path.as_path().cmp(path))
    }
}

/// Load state of a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unloaded,
    Loaded,
    Reloading,
    Failed,
}

/// Outcome of a [`PipelineRegistry::populate`] call.
#[derive(Debug, Default)]
pub struct PopulateReport {
    /// Paths installed with a freshly loaded handler.
    pub loaded: Vec<PathBuf>,
    /// Paths that kept their previous handler (load failed or was superseded).
    pub retained: Vec<PathBuf>,
    /// Load failures, in path order.
    pub failed: Vec<LoadError>,
    /// Generation of the installed snapshot.
    pub generation: u64,
}

impl PopulateReport {
    /// Number of entries in the installed snapshot.
    pub fn installed(&self) -> usize {
        self.loaded.len() + self.retained.len()
    }
}

/// Errors returned by [`PipelineRegistry::reload_one`].
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("reload of {} superseded by a newer load", path.display())]
    Superseded { path: PathBuf },
}

/// Path set installed by the latest populate, and that populate's ticket.
#[derive(Debug, Default)]
struct Membership {
    paths: BTreeSet<PathBuf>,
    since: u64,
}

impl Membership {
    /// True when a populate newer than `ticket` left `path` out.
    fn excludes(&self, path: &Path, ticket: u64) -> bool {
        self.since > ticket && !self.paths.contains(path)
    }
}

/// Owns the live pipeline for one server instance.
pub struct PipelineRegistry {
    current: ArcSwap<Pipeline>,
    defaults: Arc<Vec<SharedHandler>>,
    loader: Arc<dyn HandlerLoader>,
    tickets: AtomicU64,
    install: Mutex<Membership>,
    states: DashMap<PathBuf, EntryState>,
}

impl PipelineRegistry {
    /// Create an empty registry. `defaults` run ahead of every loaded handler.
    pub fn new(loader: Arc<dyn HandlerLoader>, defaults: Vec<SharedHandler>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Pipeline::empty()),
            defaults: Arc::new(defaults),
            loader,
            tickets: AtomicU64::new(0),
            install: Mutex::new(Membership::default()),
            states: DashMap::new(),
        }
    }

    /// The snapshot new requests are dispatched against.
    pub fn snapshot(&self) -> Arc<Pipeline> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.current.load().paths().map(Path::to_path_buf).collect()
    }

    pub fn entry_state(&self, path: &Path) -> EntryState {
        self.states
            .get(path)
            .map(|s| *s.value())
            .unwrap_or(EntryState::Unloaded)
    }

    /// Load every path concurrently and install exactly that set.
    ///
    /// Paths absent from `paths` are dropped. A failed load keeps the
    /// previous handler for that path when there is one.
    pub async fn populate(&self, paths: &BTreeSet<PathBuf>) -> PopulateReport {
        let started = Instant::now();
        let since = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let loads = paths.iter().map(|path| async move {
            let ticket = self.begin_load(path);
            let result = self.loader.load(path).await;
            (path.clone(), ticket, result)
        });
        let results = join_all(loads).await;

        let mut membership = self.install.lock().await;
        let previous = self.current.load_full();
        let mut report = PopulateReport::default();
        let mut entries = Vec::with_capacity(results.len());

        for (path, ticket, result) in results {
            let prior = previous.get(&path);
            match result {
                Ok(handler) => {
                    metrics::record_load("success");
                    match prior {
                        Some(newer) if newer.loaded_at_version > ticket => {
                            entries.push(newer.clone());
                            report.retained.push(path.clone());
                        }
                        _ => {
                            entries.push(HandlerEntry::new(path.clone(), handler, ticket));
                            report.loaded.push(path.clone());
                        }
                    }
                    self.states.insert(path, EntryState::Loaded);
                }
                Err(err) => {
                    metrics::record_load("failure");
                    tracing::warn!(path = %path.display(), error = %err, "Failed to load middleware");
                    if let Some(good) = prior {
                        entries.push(good.clone());
                        report.retained.push(path.clone());
                    }
                    self.states.insert(path, EntryState::Failed);
                    report.failed.push(err);
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        self.states.retain(|path, _| paths.contains(path));
        report.generation = self.store(&previous, entries);
        *membership = Membership {
            paths: paths.clone(),
            since,
        };

        tracing::info!(
            loaded = report.loaded.len(),
            retained = report.retained.len(),
            failed = report.failed.len(),
            generation = report.generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline populated"
        );
        report
    }

    /// Reload one path and swap in the new handler.
    ///
    /// On failure the installed snapshot is left untouched. Returns the
    /// ticket the new entry was installed with.
    pub async fn reload_one(&self, path: &Path) -> Result<u64, ReloadError> {
        let ticket = self.begin_load(path);
        let result = self.loader.load(path).await;

        let membership = self.install.lock().await;
        let previous = self.current.load_full();
        let removed = membership.excludes(path, ticket);
        let newer_installed = previous
            .get(path)
            .is_some_and(|e| e.loaded_at_version > ticket);

        let handler = match result {
            Ok(handler) => handler,
            Err(err) => {
                metrics::record_reload("failure");
                if !newer_installed && !removed {
                    self.states.insert(path.to_path_buf(), EntryState::Failed);
                }
                return Err(err.into());
            }
        };

        if newer_installed || removed {
            if removed {
                tracing::debug!(path = %path.display(), "Reload dropped, path removed by a newer populate");
            }
            metrics::record_reload("superseded");
            return Err(ReloadError::Superseded {
                path: path.to_path_buf(),
            });
        }

        let entry = HandlerEntry::new(path.to_path_buf(), handler, ticket);
        let mut entries = previous.entries.clone();
        match previous.position(path) {
            Ok(i) => entries[i] = entry,
            Err(i) => entries.insert(i, entry),
        }
        let generation = self.store(&previous, entries);
        self.states.insert(path.to_path_buf(), EntryState::Loaded);
        metrics::record_reload("success");

        tracing::info!(
            path = %path.display(),
            version = ticket,
            generation,
            "Middleware reloaded"
        );
        Ok(ticket)
    }

    /// Run `req` through the defaults and every installed handler, ending in `host`.
    pub async fn dispatch(&self, req: Request<Body>, host: middleware::Next) -> Response {
        let next = Next::new(self.defaults.clone(), self.snapshot(), host);
        match next.run(req).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "Middleware dispatch failed");
                metrics::record_dispatch_error(matches!(err, DispatchError::Panicked { .. }));
                err.into_response()
            }
        }
    }

    fn begin_load(&self, path: &Path) -> u64 {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(mut state) = self.states.get_mut(path) {
            if matches!(*state, EntryState::Loaded | EntryState::Failed) {
                *state = EntryState::Reloading;
            }
        }
        ticket
    }

    /// Caller must hold the install lock.
    fn store(&self, previous: &Pipeline, entries: Vec<HandlerEntry>) -> u64 {
        let generation = previous.generation + 1;
        metrics::set_pipeline_entries(entries.len());
        self.current.store(Arc::new(Pipeline {
            generation,
            entries,
        }));
        generation
    }
}
