//! File watching for middleware hot reload.
//!
//! # Flow
//! ```text
//! notify → fs.rs (FileEvent) → debouncer.rs → coordinator.rs → PipelineRegistry
//! ```
//!
//! Content changes to a tracked file reload that single entry. Anything that
//! can change which files the patterns match triggers a relocate and, if the
//! set differs, a full rebuild.

pub mod coordinator;
pub mod debouncer;
pub mod event;
pub mod fs;

pub use coordinator::{BatchOutcome, WatchCoordinator};
pub use debouncer::Debouncer;
pub use event::{classify, Action, FileEvent, FileEventKind};
pub use fs::FsWatcher;
