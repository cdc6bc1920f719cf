//! Middleware file discovery.
//!
//! # Data Flow
//! ```text
//! configured patterns (string | list)
//!     → patterns.rs (normalize config shape)
//!     → locator.rs (glob expansion relative to cwd)
//!     → BTreeSet<PathBuf> (absolute, canonical directories, sorted)
//! ```
//!
//! # Design Decisions
//! - Sorted set output: callers get a deterministic order for free
//! - No match is not an error; only malformed patterns are

pub mod locator;
pub mod patterns;

pub use locator::{locate, validate_pattern, watch_roots, LocatorError};
pub use patterns::Patterns;
