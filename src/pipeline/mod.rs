//! Pipeline subsystem: the live set of loaded handlers.
//!
//! # Data Flow
//! ```text
//! request
//!     → entry.rs (prefix check, installed once into the host router)
//!     → registry.rs (take current snapshot)
//!     → handler.rs Next chain: defaults… → entries in path order… → host Next
//!       (layer.rs runs tower layers as links of that chain)
//!
//! populate / reload_one
//!     → HandlerLoader (concurrent, unlocked)
//!     → install lock → build new Pipeline → ArcSwap::store
//! ```
//!
//! # Design Decisions
//! - Requests hold an `Arc<Pipeline>` for their whole lifetime; swaps never
//!   affect in-flight requests
//! - Handler failures and panics end that one request with a 500

pub mod entry;
pub mod handler;
pub mod layer;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use entry::{entry_point, EntryPoint};
pub use handler::{handler_fn, DispatchError, Handler, Next, SharedHandler};
pub use layer::{from_layer, Continue, LayerHandler};
pub use registry::{EntryState, HandlerEntry, Pipeline, PipelineRegistry, PopulateReport, ReloadError};
