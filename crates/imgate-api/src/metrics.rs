//! Prometheus metrics for the gateway.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "imgate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "imgate_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "imgate_http_requests_in_flight";

    // Cache metrics
    pub const CACHE_LOOKUPS_TOTAL: &str = "imgate_cache_lookups_total";
    pub const CACHE_STORES_TOTAL: &str = "imgate_cache_stores_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "imgate_cache_invalidations_total";
    pub const CACHE_FILLS_DISCARDED_TOTAL: &str = "imgate_cache_fills_discarded_total";

    // Access decisions
    pub const ACCESS_DENIED_TOTAL: &str = "imgate_access_denied_total";

    // Edge purge
    pub const PURGE_REQUESTS_TOTAL: &str = "imgate_purge_requests_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let labels = [("result", if hit { "hit" } else { "miss" }.to_string())];
    counter!(names::CACHE_LOOKUPS_TOTAL, &labels).increment(1);
}

/// Record a completed background cache write.
pub fn record_cache_store(status: u16) {
    let labels = [("status", status.to_string())];
    counter!(names::CACHE_STORES_TOTAL, &labels).increment(1);
}

pub fn record_cache_invalidation() {
    counter!(names::CACHE_INVALIDATIONS_TOTAL).increment(1);
}

/// Record a background cache write dropped because its grant changed first.
pub fn record_cache_fill_discarded() {
    counter!(names::CACHE_FILLS_DISCARDED_TOTAL).increment(1);
}

/// Record a request refused for lack of a grant. `reason` is `denied` or `error`.
pub fn record_access_denied(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::ACCESS_DENIED_TOTAL, &labels).increment(1);
}

pub fn record_purge(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::PURGE_REQUESTS_TOTAL, &labels).increment(1);
}

static IMAGE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/images/[^/]+/[^/]+$").expect("image path label pattern is valid")
});

/// Sanitize path for metrics labels (user IDs and file hashes collapse).
fn sanitize_path(path: &str) -> String {
    match path {
        "/health" | "/metrics" => path.to_string(),
        _ if IMAGE_PATH.is_match(path) => "/images/:user_id/:file".to_string(),
        _ => "other".to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/images/u1/abcd.webp"),
            "/images/:user_id/:file"
        );
        assert_eq!(sanitize_path("/health"), "/health");
        assert_eq!(sanitize_path("/images/u1/a/b.webp"), "other");
        assert_eq!(sanitize_path("/wp-login.php"), "other");
    }
}
