//! Built-in default middlewares.
//!
//! Run ahead of every loaded handler unless the integrator supplies its own
//! list, which replaces these entirely.
//!
//! # Order
//! ```text
//! cors.rs → json_body.rs → no_cache.rs → loaded handlers…
//! ```

pub mod cors;
pub mod json_body;
pub mod no_cache;

use std::sync::Arc;

use crate::pipeline::SharedHandler;

pub use cors::Cors;
pub use json_body::{JsonBody, ParsedJson};
pub use no_cache::NoCache;

/// The built-in defaults, in execution order.
pub fn builtin() -> Vec<SharedHandler> {
    vec![Arc::new(Cors::new()), Arc::new(JsonBody::default()), Arc::new(NoCache)]
}
