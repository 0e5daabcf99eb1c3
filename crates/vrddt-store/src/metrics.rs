//! Store metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Store requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "vrddt_store_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "vrddt_store_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "vrddt_store_latency_seconds";
}

/// Record metrics for a completed store request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}
