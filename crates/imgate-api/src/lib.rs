//! Axum image gateway.
//!
//! This crate provides:
//! - Routing for `/images/{user_id}/{file_hash}.{ext}`
//! - Grant-checked reads with a shared response cache
//! - Token-protected uploads and revocations against an S3-compatible origin
//! - Prometheus metrics and structured request logging

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod purge;
pub mod router;
pub mod routes;
pub mod state;

pub use cache::{CacheFill, CacheLayer, CachedResponse, Lookup, MemoryResponseCache, ResponseCache};
pub use config::{ConfigError, GatewayConfig, PurgeConfig};
pub use error::{ApiError, ApiResult};
pub use purge::PurgeClient;
pub use routes::create_router;
pub use state::AppState;
