//! Request matching subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → matcher.rs (evaluate match conditions)
//!     → used by the entry point (prefix mount) and by manifest handlers
//! ```
//!
//! # Design Decisions
//! - Matchers compiled once when a handler loads, immutable afterwards
//! - No regex in hot path (exact and prefix matching only)
//! - Deterministic: same input always gives the same answer

pub mod matcher;

pub use matcher::{AndMatcher, ExactPathMatcher, Matcher, MethodMatcher, PathPrefixMatcher};
