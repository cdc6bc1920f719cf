//! File events and how they map to pipeline operations.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind};

/// Kind of change reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    /// Contents changed in place.
    Change,
    /// Path appeared (created or renamed into place).
    Add,
    /// Path disappeared (deleted or renamed away).
    Remove,
}

impl FileEventKind {
    /// Add and Remove may change which files the patterns match.
    pub fn affects_membership(self) -> bool {
        matches!(self, FileEventKind::Add | FileEventKind::Remove)
    }
}

/// A single file event for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Change, path)
    }

    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Add, path)
    }

    pub fn remove(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Remove, path)
    }

    /// Translate a `notify` event into per-path file events.
    ///
    /// Renames are reported as `Add` for every involved path; the coordinator
    /// re-locates on membership events, which covers both sides of a rename.
    pub fn from_notify(event: &notify::Event) -> Vec<FileEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Add,
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Add,
            EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
            EventKind::Modify(_) => FileEventKind::Change,
            EventKind::Remove(_) => FileEventKind::Remove,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
        };
        event
            .paths
            .iter()
            .map(|path| FileEvent::new(kind, path.clone()))
            .collect()
    }
}

/// What the coordinator should do about an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reload a single tracked path.
    Reload(PathBuf),
    /// Membership changed: repopulate with this set.
    Rebuild(BTreeSet<PathBuf>),
    Ignore,
}

/// Decide how to react to `event`.
///
/// `located` is the fresh locator result, required for membership events;
/// `None` means relocation failed and the event is ignored. A membership event
/// that leaves the set unchanged but touches a tracked path (an editor
/// replacing the file through a rename) is a reload.
pub fn classify(
    event: &FileEvent,
    watched: &BTreeSet<PathBuf>,
    located: Option<&BTreeSet<PathBuf>>,
) -> Action {
    let tracked = |path: &Path| watched.contains(path);

    match event.kind {
        FileEventKind::Change if tracked(&event.path) => Action::Reload(event.path.clone()),
        FileEventKind::Change => Action::Ignore,
        FileEventKind::Add | FileEventKind::Remove => match located {
            Some(located) if located != watched => Action::Rebuild(located.clone()),
            Some(_) if tracked(&event.path) && event.path.exists() => {
                Action::Reload(event.path.clone())
            }
            _ => Action::Ignore,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_change_on_tracked_reloads() {
        let watched = set(&["/mw/a", "/mw/b"]);
        assert_eq!(
            classify(&FileEvent::change("/mw/a"), &watched, None),
            Action::Reload(PathBuf::from("/mw/a"))
        );
    }

    #[test]
    fn test_change_on_untracked_ignored() {
        let watched = set(&["/mw/a"]);
        assert_eq!(classify(&FileEvent::change("/mw/z"), &watched, None), Action::Ignore);
    }

    #[test]
    fn test_add_changing_membership_rebuilds() {
        let watched = set(&["/mw/a", "/mw/b"]);
        let located = set(&["/mw/a", "/mw/b", "/mw/c"]);
        assert_eq!(
            classify(&FileEvent::add("/mw/c"), &watched, Some(&located)),
            Action::Rebuild(located.clone())
        );
    }

    #[test]
    fn test_add_not_matching_patterns_ignored() {
        let watched = set(&["/mw/a"]);
        let located = watched.clone();
        assert_eq!(
            classify(&FileEvent::add("/mw/notes.txt"), &watched, Some(&located)),
            Action::Ignore
        );
    }

    #[test]
    fn test_remove_rebuilds() {
        let watched = set(&["/mw/a", "/mw/b"]);
        let located = set(&["/mw/a"]);
        assert_eq!(
            classify(&FileEvent::remove("/mw/b"), &watched, Some(&located)),
            Action::Rebuild(located.clone())
        );
    }

    #[test]
    fn test_relocate_failure_ignored() {
        let watched = set(&["/mw/a"]);
        assert_eq!(classify(&FileEvent::add("/mw/b"), &watched, None), Action::Ignore);
    }

    #[test]
    fn test_atomic_save_of_tracked_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.toml");
        std::fs::write(&file, "").unwrap();

        let watched: BTreeSet<PathBuf> = [file.clone()].into_iter().collect();
        assert_eq!(
            classify(&FileEvent::add(file.clone()), &watched, Some(&watched)),
            Action::Reload(file)
        );
    }

    #[test]
    fn test_from_notify_kinds() {
        let path = PathBuf::from("/mw/a");
        let event = |kind| notify::Event::new(kind).add_path(path.clone());

        let cases = [
            (EventKind::Create(CreateKind::File), Some(FileEventKind::Add)),
            (EventKind::Modify(ModifyKind::Data(DataChange::Content)), Some(FileEventKind::Change)),
            (EventKind::Modify(ModifyKind::Name(RenameMode::From)), Some(FileEventKind::Add)),
            (EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), None),
            (EventKind::Remove(RemoveKind::File), Some(FileEventKind::Remove)),
            (EventKind::Access(notify::event::AccessKind::Read), None),
        ];
        for (kind, expected) in cases {
            let label = format!("{kind:?}");
            let events = FileEvent::from_notify(&event(kind));
            assert_eq!(events.first().map(|e| e.kind), expected, "{label}");
        }
    }
}
