//! Firestore request metrics.

use metrics::{counter, histogram};

pub mod names {
    pub const REQUESTS_TOTAL: &str = "reelgen_firestore_requests_total";
    pub const RETRIES_TOTAL: &str = "reelgen_firestore_retries_total";
    pub const LATENCY_SECONDS: &str = "reelgen_firestore_latency_seconds";
    pub const CAS_CONFLICTS_TOTAL: &str = "reelgen_firestore_cas_conflicts_total";
}

/// Record a completed request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation.to_string())
        .record(latency_ms / 1000.0);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// A conditional write lost against a concurrent writer.
pub fn record_cas_conflict(collection: &str) {
    counter!(names::CAS_CONFLICTS_TOTAL, "collection" => collection.to_string()).increment(1);
}
