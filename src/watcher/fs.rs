//! Bridge from `notify` to the coordinator's event channel.

use std::path::PathBuf;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::watcher::event::FileEvent;

/// Watches the middleware directories and forwards file events.
pub struct FsWatcher {
    roots: Vec<PathBuf>,
    event_tx: mpsc::UnboundedSender<FileEvent>,
}

impl FsWatcher {
    /// Create a new FsWatcher.
    ///
    /// Returns the watcher and a receiver for file events.
    pub fn new(roots: Vec<PathBuf>) -> (Self, mpsc::UnboundedReceiver<FileEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { roots, event_tx }, event_rx)
    }

    /// Start watching. Events flow until the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.event_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(&event) {
                        tracing::trace!(kind = ?file_event.kind, path = %file_event.path.display(), "File event");
                        if tx.send(file_event).is_err() {
                            // Coordinator is gone; nothing left to notify.
                            return;
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        for root in &self.roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            tracing::info!(path = %root.display(), "Watching middleware directory");
        }

        Ok(watcher)
    }
}
