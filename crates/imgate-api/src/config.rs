//! Gateway configuration.

use std::time::Duration;

use thiserror::Error;

/// Default upload limit: 8 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Freshness lifetime for cached image responses (one year).
pub const IMAGE_CACHE_TTL: Duration = Duration::from_secs(31_536_000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("Invalid {name}: {detail}")]
    Invalid { name: &'static str, detail: String },
}

/// Edge purge endpoint settings.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// Endpoint receiving `{"files": [...]}` purge requests
    pub url: String,
    /// Bearer token for the purge endpoint
    pub token: Option<String>,
    /// Public origin prepended to request paths (e.g. `https://cdn.example.com`)
    pub public_base_url: String,
}

/// Gateway configuration. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Bearer token required for PUT and DELETE
    pub upload_token: String,
    /// Max accepted upload size in bytes
    pub max_upload_bytes: usize,
    /// Max entries held by the in-process response cache
    pub cache_max_entries: usize,
    /// Freshness lifetime for cached 404 responses
    pub negative_cache_ttl: Duration,
    /// Edge purge settings, when configured
    pub purge: Option<PurgeConfig>,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upload_token: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cache_max_entries: 10_000,
            negative_cache_ttl: Duration::from_secs(60),
            purge: None,
            metrics_enabled: true,
        }
    }
}

impl GatewayConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let upload_token =
            std::env::var("UPLOAD_TOKEN").map_err(|_| ConfigError::Missing("UPLOAD_TOKEN"))?;
        if upload_token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "UPLOAD_TOKEN",
                detail: "must not be empty".to_string(),
            });
        }

        let purge = match std::env::var("PURGE_URL") {
            Ok(url) if !url.is_empty() => Some(PurgeConfig {
                url,
                token: std::env::var("PURGE_TOKEN").ok().filter(|t| !t.is_empty()),
                public_base_url: std::env::var("PUBLIC_BASE_URL")
                    .map_err(|_| ConfigError::Missing("PUBLIC_BASE_URL"))?
                    .trim_end_matches('/')
                    .to_string(),
            }),
            _ => None,
        };

        let defaults = Self::default();

        Ok(Self {
            host: std::env::var("GATEWAY_HOST").unwrap_or(defaults.host),
            port: std::env::var("GATEWAY_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            upload_token,
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            cache_max_entries: std::env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_max_entries),
            negative_cache_ttl: std::env::var("NEGATIVE_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.negative_cache_ttl),
            purge,
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        })
    }

    /// `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
