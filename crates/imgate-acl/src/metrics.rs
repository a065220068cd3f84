//! Access-control store metrics.
//!
//! - Request counters by operation and outcome
//! - Latency histograms

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total access-control requests by operation and outcome.
    pub const REQUESTS_TOTAL: &str = "imgate_acl_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "imgate_acl_latency_seconds";
}

/// Record metrics for a completed access-control request.
pub fn record_request(operation: &str, outcome: &str, latency_secs: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REQUESTS_TOTAL.contains("requests"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
    }
}
