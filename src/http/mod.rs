//! HTTP host server.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs layers (request ID, trace, timeout)
//!     → pipeline entry point (under prefix_url)
//!     → host chain: static directory or 404
//! ```

pub mod server;

pub use server::{DevServer, X_REQUEST_ID};
