//! Prometheus metrics for trunk allocation
//!
//! Counters are always updated; they only show up in
//! [`export_metrics`] once [`init_metrics`] has registered them.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Registry holding every trunkstore metric
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    /// Allocation requests by outcome: reused, created, failed
    pub static ref TRUNK_ALLOCATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("trunkstore_allocations_total", "Trunk space allocation requests"),
        &["outcome"]
    ).unwrap();

    pub static ref TRUNK_FILES_CREATED: IntCounter = IntCounter::new(
        "trunkstore_trunk_files_created_total",
        "Trunk files created and pre-allocated"
    ).unwrap();

    pub static ref TRUNK_BYTES_PREALLOCATED: IntCounter = IntCounter::new(
        "trunkstore_preallocated_bytes_total",
        "Bytes zero-filled into new trunk files"
    ).unwrap();

    pub static ref TRUNK_SPACES_REGISTERED: IntCounter = IntCounter::new(
        "trunkstore_free_spaces_registered_total",
        "Free trunk spaces handed to the allocator"
    ).unwrap();
}

/// Allocation outcome labels
pub const OUTCOME_REUSED: &str = "reused";
pub const OUTCOME_CREATED: &str = "created";
pub const OUTCOME_FAILED: &str = "failed";

/// Count one allocation request
pub fn record_allocation(outcome: &str) {
    TRUNK_ALLOCATIONS.with_label_values(&[outcome]).inc();
}

/// Register all metrics with [`METRICS_REGISTRY`]. Safe to call twice.
pub fn init_metrics() {
    info!("Initializing trunk allocator metrics");

    METRICS_REGISTRY.register(Box::new(TRUNK_ALLOCATIONS.clone())).ok();
    METRICS_REGISTRY.register(Box::new(TRUNK_FILES_CREATED.clone())).ok();
    METRICS_REGISTRY.register(Box::new(TRUNK_BYTES_PREALLOCATED.clone())).ok();
    METRICS_REGISTRY.register(Box::new(TRUNK_SPACES_REGISTERED.clone())).ok();
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# Error converting metrics\n"))
}
