//! Glob expansion into concrete middleware file paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use thiserror::Error;

use crate::discovery::Patterns;

const GLOB_META: [char; 3] = ['*', '?', '['];

/// Errors raised while locating middleware files.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// The pattern is not valid glob syntax.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Check a single pattern for glob syntax errors without touching the file system.
pub fn validate_pattern(pattern: &str) -> Result<(), LocatorError> {
    glob::Pattern::new(pattern)
        .map(|_| ())
        .map_err(|e| LocatorError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Expand `patterns` relative to `cwd` into a deduplicated, sorted set of
/// absolute file paths.
///
/// A pattern that matches nothing contributes nothing; only malformed
/// patterns fail.
pub fn locate(patterns: &Patterns, cwd: &Path) -> Result<BTreeSet<PathBuf>, LocatorError> {
    let mut found = BTreeSet::new();

    for pattern in patterns.iter() {
        let absolute = resolve_pattern(pattern, cwd);
        let entries = glob::glob(&absolute).map_err(|e| LocatorError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(normalize_file(&path));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %e.path().display(),
                        error = %e.error(),
                        "Skipping unreadable path while expanding pattern"
                    );
                }
            }
        }
    }

    tracing::debug!(count = found.len(), "Located middleware files");
    Ok(found)
}

/// Directories to subscribe to so that files matching `patterns` are noticed
/// even when they do not exist yet.
///
/// Each root is the literal directory prefix of a pattern, walked up to the
/// nearest existing ancestor. Roots nested in another root are dropped since
/// watches are recursive.
pub fn watch_roots(patterns: &Patterns, cwd: &Path) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = patterns
        .iter()
        .map(|pattern| {
            let absolute = cwd.join(strip_dot(pattern));
            let mut root = PathBuf::new();
            let mut literal = true;
            for component in absolute.components() {
                if component.as_os_str().to_string_lossy().contains(GLOB_META) {
                    literal = false;
                    break;
                }
                root.push(component);
            }
            // A fully literal pattern names a file; watch its directory.
            if literal {
                root.pop();
            }
            while !root.exists() {
                if !root.pop() {
                    break;
                }
            }
            canonical(&root)
        })
        .collect();

    roots.sort();
    roots.dedup();

    let mut pruned: Vec<PathBuf> = Vec::with_capacity(roots.len());
    for root in roots {
        if !pruned.iter().any(|kept| root.starts_with(kept)) {
            pruned.push(root);
        }
    }
    pruned
}

fn resolve_pattern(pattern: &str, cwd: &Path) -> String {
    if Path::new(pattern).is_absolute() {
        return pattern.to_string();
    }
    let base = glob::Pattern::escape(&cwd.to_string_lossy());
    format!(
        "{}{}{}",
        base.trim_end_matches(MAIN_SEPARATOR),
        MAIN_SEPARATOR,
        strip_dot(pattern)
    )
}

fn strip_dot(pattern: &str) -> &str {
    pattern.strip_prefix("./").unwrap_or(pattern)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonical directory, file name as matched.
///
/// A symlinked middleware file keeps its link path, which is the path the
/// watcher reports when the link's directory changes.
fn normalize_file(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => canonical(parent).join(name),
        _ => canonical(path),
    }
}
