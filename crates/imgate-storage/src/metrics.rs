//! Object store metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total object store requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "imgate_storage_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "imgate_storage_latency_seconds";
}

/// Record a completed object store request. `status` is `None` on transport failure.
pub fn record_request(operation: &str, status: Option<u16>, latency_secs: f64) {
    let status_str = status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "error".to_string());

    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status_str
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_secs);
}
