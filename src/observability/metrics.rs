//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dev_middleware_loads_total` (counter): handler loads by outcome
//! - `dev_middleware_reloads_total` (counter): single-path reloads by outcome
//! - `dev_middleware_rebuilds_total` (counter): membership-driven rebuilds
//! - `dev_middleware_pipeline_entries` (gauge): entries in the live pipeline
//! - `dev_middleware_dispatch_errors_total` (counter): failed or panicked handlers
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const LOADS_TOTAL: &str = "dev_middleware_loads_total";
pub const RELOADS_TOTAL: &str = "dev_middleware_reloads_total";
pub const REBUILDS_TOTAL: &str = "dev_middleware_rebuilds_total";
pub const PIPELINE_ENTRIES: &str = "dev_middleware_pipeline_entries";
pub const DISPATCH_ERRORS_TOTAL: &str = "dev_middleware_dispatch_errors_total";

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// `outcome` is `success` or `failure`.
pub fn record_load(outcome: &'static str) {
    counter!(LOADS_TOTAL, "outcome" => outcome).increment(1);
}

/// Like [`record_load`], plus `superseded` for reloads beaten by a newer one.
pub fn record_reload(outcome: &'static str) {
    counter!(RELOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_rebuild() {
    counter!(REBUILDS_TOTAL).increment(1);
}

pub fn set_pipeline_entries(count: usize) {
    gauge!(PIPELINE_ENTRIES).set(count as f64);
}

pub fn record_dispatch_error(panicked: bool) {
    let kind = if panicked { "panic" } else { "error" };
    counter!(DISPATCH_ERRORS_TOTAL, "kind" => kind).increment(1);
}
