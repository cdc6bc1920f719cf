//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject malformed glob patterns before anything touches the disk
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DevConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::DevConfig;
use crate::discovery::validate_pattern;

/// One semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed config, collecting every problem.
pub fn validate_config(config: &DevConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("`{}` is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "server.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    let middleware = &config.middleware;
    if !middleware.prefix_url.starts_with('/') {
        errors.push(ValidationError::new(
            "middleware.prefix_url",
            format!("`{}` must start with '/'", middleware.prefix_url),
        ));
    }
    if middleware.files.is_empty() {
        errors.push(ValidationError::new("middleware.files", "at least one pattern is required"));
    }
    for pattern in middleware.files.iter() {
        if let Err(e) = validate_pattern(pattern) {
            errors.push(ValidationError::new("middleware.files", e.to_string()));
        }
    }

    let observability = &config.observability;
    if observability.log_level.parse::<tracing::Level>().is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("`{}` is not a log level", observability.log_level),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
