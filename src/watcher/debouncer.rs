//! Per-path debouncing of file events.
//!
//! Editors often emit several events for one save (truncate, write, rename).
//! Events are held until their path has been quiet for the debounce window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::watcher::event::{FileEvent, FileEventKind};

/// Debounces file events by path.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending events: path -> (merged kind, last event time).
    pending: HashMap<PathBuf, (FileEventKind, Instant)>,
    /// How long a path must be quiet before its event is released.
    duration: Duration,
}

impl Debouncer {
    pub fn new(duration: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Record an event now.
    pub fn record(&mut self, event: FileEvent) {
        self.record_at(event, Instant::now());
    }

    /// Record an event at `at`, resetting the window for its path.
    ///
    /// A membership kind is never downgraded to `Change` by a later event.
    pub fn record_at(&mut self, event: FileEvent, at: Instant) {
        let FileEvent { kind, path } = event;
        self.pending
            .entry(path)
            .and_modify(|(merged, last)| {
                if kind.affects_membership() || !merged.affects_membership() {
                    *merged = kind;
                }
                *last = at;
            })
            .or_insert((kind, at));
    }

    /// Take every event whose path has been quiet for the window, sorted by path.
    pub fn take_ready(&mut self) -> Vec<FileEvent> {
        self.take_ready_at(Instant::now())
    }

    pub fn take_ready_at(&mut self, now: Instant) -> Vec<FileEvent> {
        let mut ready = Vec::new();
        self.pending.retain(|path, (kind, last)| {
            if now.duration_since(*last) >= self.duration {
                ready.push(FileEvent::new(*kind, path.clone()));
                false
            } else {
                true
            }
        });
        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    /// When the earliest pending path becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|(_, last)| *last + self.duration)
            .min()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
