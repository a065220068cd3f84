//! Gateway routes.

use axum::middleware;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::handlers::health;
use crate::metrics::metrics_middleware;
use crate::middleware::{make_request_span, request_id, request_logging, security_headers};
use crate::router::dispatch;
use crate::state::AppState;

/// Create the gateway router.
///
/// Operational paths only answer GET/HEAD themselves; every other method on
/// them falls through to the image dispatcher, which answers `OPTIONS` and
/// rejects the rest.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let health_routes = Router::new().route("/health", get(health).fallback(dispatch));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route(
            "/metrics",
            get(move || async move { handle.render() }).fallback(dispatch),
        )
    } else {
        Router::new()
    };

    Router::new()
        .merge(health_routes)
        .merge(metrics_routes)
        .fallback(dispatch)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .with_state(state)
}
