//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! dev-middleware.toml
//!     → loader.rs (read & deserialize, defaults when absent)
//!     → CLI overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → DevConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Middleware files are watched; the config file itself is not

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_or_default, ConfigError};
pub use schema::{DevConfig, LogFormat, MiddlewareConfig, ObservabilityConfig, ServerConfig};
pub use validation::{validate_config, ValidationError};
