//! Applies debounced file events to the pipeline registry, one batch at a time.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};

use crate::discovery::{locate, Patterns};
use crate::observability::metrics;
use crate::pipeline::{PipelineRegistry, ReloadError};
use crate::watcher::debouncer::Debouncer;
use crate::watcher::event::{classify, Action, FileEvent};

/// Summary of one applied batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Whether the batch triggered a full rebuild.
    pub rebuilt: bool,
    pub reloaded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub ignored: usize,
}

/// Owns the watched path set and serializes all watch-driven pipeline changes.
pub struct WatchCoordinator {
    registry: Arc<PipelineRegistry>,
    patterns: Patterns,
    cwd: PathBuf,
    watched: BTreeSet<PathBuf>,
    debouncer: Debouncer,
}

impl WatchCoordinator {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        patterns: Patterns,
        cwd: PathBuf,
        watched: BTreeSet<PathBuf>,
        debounce: Duration,
    ) -> Self {
        Self {
            registry,
            patterns,
            cwd,
            watched,
            debouncer: Debouncer::new(debounce),
        }
    }

    /// The path set from the last locator run.
    pub fn watched(&self) -> &BTreeSet<PathBuf> {
        &self.watched
    }

    /// Consume events until the channel closes or shutdown fires.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<FileEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            watched = self.watched.len(),
            debounce_ms = self.debouncer.duration().as_millis() as u64,
            "Watch coordinator started"
        );

        loop {
            let deadline = self.debouncer.next_deadline().map(Instant::from_std);
            let wake = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                maybe = events.recv() => match maybe {
                    Some(event) => self.debouncer.record(event),
                    None => break,
                },
                _ = sleep_until(wake), if deadline.is_some() => {
                    let ready = self.debouncer.take_ready();
                    if !ready.is_empty() {
                        self.apply(ready).await;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Watch coordinator received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Apply one batch of events.
    ///
    /// A batch with any membership change performs exactly one rebuild, which
    /// reloads every file and so subsumes the batch's single-path reloads.
    pub async fn apply(&mut self, batch: Vec<FileEvent>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut located: Option<Option<BTreeSet<PathBuf>>> = None;
        let mut reloads: Vec<PathBuf> = Vec::new();
        let mut rebuild: Option<BTreeSet<PathBuf>> = None;

        for event in &batch {
            let fresh = if event.kind.affects_membership() {
                located
                    .get_or_insert_with(|| match locate(&self.patterns, &self.cwd) {
                        Ok(set) => Some(set),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to re-locate middleware files");
                            None
                        }
                    })
                    .as_ref()
            } else {
                None
            };

            match classify(event, &self.watched, fresh) {
                Action::Reload(path) => {
                    if !reloads.contains(&path) {
                        reloads.push(path);
                    }
                }
                Action::Rebuild(paths) => rebuild = Some(paths),
                Action::Ignore => {
                    tracing::trace!(path = %event.path.display(), kind = ?event.kind, "Ignoring file event");
                    outcome.ignored += 1;
                }
            }
        }

        if let Some(paths) = rebuild {
            tracing::info!(
                before = self.watched.len(),
                after = paths.len(),
                "Middleware set changed, rebuilding pipeline"
            );
            metrics::record_rebuild();
            let report = self.registry.populate(&paths).await;
            outcome.rebuilt = true;
            outcome.reloaded = report.loaded;
            outcome.failed = report.failed.iter().map(|e| e.path().to_path_buf()).collect();
            self.watched = paths;
            return outcome;
        }

        for path in reloads {
            match self.registry.reload_one(&path).await {
                Ok(_) => outcome.reloaded.push(path),
                Err(ReloadError::Superseded { .. }) => {
                    tracing::debug!(path = %path.display(), "Reload superseded");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Reload failed, keeping last good handler"
                    );
                    outcome.failed.push(path);
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::loader::ManifestLoader;
    use crate::pipeline::testing::{get, mounted};
    use crate::pipeline::EntryState;

    fn write(dir: &std::path::Path, name: &str, label: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("[headers]\nx-trace = \"{label}\"\n")).unwrap();
        path.canonicalize().unwrap()
    }

    async fn setup(dir: &tempfile::TempDir) -> (Arc<PipelineRegistry>, WatchCoordinator) {
        let registry = Arc::new(PipelineRegistry::new(Arc::new(ManifestLoader::new()), Vec::new()));
        let patterns = Patterns::from("mw/*.toml");
        let watched = locate(&patterns, dir.path()).unwrap();
        registry.populate(&watched).await;
        let coordinator = WatchCoordinator::new(
            registry.clone(),
            patterns,
            dir.path().to_path_buf(),
            watched,
            Duration::from_millis(10),
        );
        (registry, coordinator)
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mw")).unwrap();
        write(&dir.path().join("mw"), "a.toml", "a");
        write(&dir.path().join("mw"), "b.toml", "b");
        dir
    }

    async fn labels(registry: &Arc<PipelineRegistry>) -> Vec<String> {
        // Header-only handlers append on the way out, innermost first.
        let (_, _, mut trace) = get(mounted(registry.clone(), "/"), "/").await;
        trace.reverse();
        trace
    }

    #[tokio::test]
    async fn test_add_event_rebuilds() {
        let dir = project();
        let (registry, mut coordinator) = setup(&dir).await;
        assert_eq!(labels(&registry).await, vec!["a", "b"]);

        let c = write(&dir.path().join("mw"), "c.toml", "c");
        let outcome = coordinator.apply(vec![FileEvent::add(c.clone())]).await;

        assert!(outcome.rebuilt);
        assert!(coordinator.watched().contains(&c));
        assert_eq!(labels(&registry).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_remove_event_drops_entry() {
        let dir = project();
        let (registry, mut coordinator) = setup(&dir).await;

        let b = dir.path().join("mw/b.toml").canonicalize().unwrap();
        fs::remove_file(&b).unwrap();
        let outcome = coordinator.apply(vec![FileEvent::remove(b)]).await;

        assert!(outcome.rebuilt);
        assert_eq!(labels(&registry).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_change_event_reloads_one() {
        let dir = project();
        let (registry, mut coordinator) = setup(&dir).await;
        let generation = registry.snapshot().generation();

        let a = write(&dir.path().join("mw"), "a.toml", "a2");
        let outcome = coordinator.apply(vec![FileEvent::change(a.clone())]).await;

        assert!(!outcome.rebuilt);
        assert_eq!(outcome.reloaded, vec![a]);
        assert_eq!(registry.snapshot().generation(), generation + 1);
        assert_eq!(labels(&registry).await, vec!["a2", "b"]);
    }

    #[tokio::test]
    async fn test_broken_edit_keeps_last_good() {
        let dir = project();
        let (registry, mut coordinator) = setup(&dir).await;

        let a = dir.path().join("mw/a.toml").canonicalize().unwrap();
        fs::write(&a, "[headers\n").unwrap();
        let outcome = coordinator.apply(vec![FileEvent::change(a.clone())]).await;

        assert_eq!(outcome.failed, vec![a]);
        assert_eq!(labels(&registry).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rebuild_keeps_last_good_for_failing_file() {
        let dir = project();
        let (registry, mut coordinator) = setup(&dir).await;

        let a = dir.path().join("mw/a.toml").canonicalize().unwrap();
        fs::write(&a, "[headers\n").unwrap();
        let c = write(&dir.path().join("mw"), "c.toml", "c");
        let outcome = coordinator.apply(vec![FileEvent::add(c.clone())]).await;

        assert!(outcome.rebuilt);
        assert_eq!(outcome.failed, vec![a.clone()]);
        assert!(!outcome.reloaded.contains(&a));
        assert!(outcome.reloaded.contains(&c));
        assert_eq!(registry.entry_state(&a), EntryState::Failed);
        assert_eq!(labels(&registry).await, vec!["a", "b", "c"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_change_to_symlinked_file_reloads_link() {
        let dir = project();
        let shared = tempfile::tempdir().unwrap();
        let target = write(shared.path(), "shared.toml", "s");
        std::os::unix::fs::symlink(&target, dir.path().join("mw/s.toml")).unwrap();
        let (registry, mut coordinator) = setup(&dir).await;
        assert_eq!(labels(&registry).await, vec!["a", "b", "s"]);

        let link = dir.path().canonicalize().unwrap().join("mw/s.toml");
        assert!(coordinator.watched().contains(&link));
        write(shared.path(), "shared.toml", "s2");
        let outcome = coordinator.apply(vec![FileEvent::change(link.clone())]).await;

        assert_eq!(outcome.reloaded, vec![link]);
        assert_eq!(labels(&registry).await, vec!["a", "b", "s2"]);
    }

    #[tokio::test]
    async fn test_untracked_and_non_matching_events_ignored() {
        let dir = project();
        let (registry, mut coordinator) = setup(&dir).await;
        let generation = registry.snapshot().generation();

        let notes = dir.path().join("mw/notes.txt");
        fs::write(&notes, "todo").unwrap();
        let outcome = coordinator
            .apply(vec![FileEvent::change(notes.clone()), FileEvent::add(notes)])
            .await;

        assert_eq!(outcome.ignored, 2);
        assert_eq!(registry.snapshot().generation(), generation);
    }

    #[tokio::test]
    async fn test_rebuild_subsumes_reloads_in_batch() {
        let dir = project();
        let (registry, mut coordinator) = setup(&dir).await;

        let a = write(&dir.path().join("mw"), "a.toml", "a2");
        let c = write(&dir.path().join("mw"), "c.toml", "c");
        let generation = registry.snapshot().generation();
        let outcome = coordinator
            .apply(vec![FileEvent::change(a), FileEvent::add(c)])
            .await;

        assert!(outcome.rebuilt);
        // One install for the whole batch
        assert_eq!(registry.snapshot().generation(), generation + 1);
        assert_eq!(labels(&registry).await, vec!["a2", "b", "c"]);
    }

    #[tokio::test]
    async fn test_run_debounces_and_stops_on_shutdown() {
        let dir = project();
        let (registry, coordinator) = setup(&dir).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(coordinator.run(rx, shutdown_rx));

        let a = write(&dir.path().join("mw"), "a.toml", "a3");
        for _ in 0..5 {
            tx.send(FileEvent::change(a.clone())).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while labels(&registry).await != vec!["a3", "b"] {
            assert!(std::time::Instant::now() < deadline, "reload never applied");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
