//! Access-control store configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{AclError, AclResult};
use crate::{AccessControl, MemoryAccessControl, RedisAccessControl, RestAccessControl};

/// Which set store backs the grant sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclBackend {
    /// Upstash-compatible REST endpoint.
    Rest { url: String, token: String },
    /// Redis server reached directly.
    Redis { url: String },
    /// Process-local sets; development only.
    Memory,
}

impl AclBackend {
    pub fn name(&self) -> &'static str {
        match self {
            AclBackend::Rest { .. } => "rest",
            AclBackend::Redis { .. } => "redis",
            AclBackend::Memory => "memory",
        }
    }
}

/// Access-control client configuration.
#[derive(Debug, Clone)]
pub struct AclConfig {
    pub backend: AclBackend,
    /// Prefix prepended to every set key (e.g. `avatar:`)
    pub key_prefix: String,
    /// Request timeout for the REST backend
    pub timeout: Duration,
}

impl AclConfig {
    /// Create config from environment variables.
    pub fn from_env() -> AclResult<Self> {
        let backend = match std::env::var("ACL_BACKEND")
            .unwrap_or_else(|_| "rest".to_string())
            .to_lowercase()
            .as_str()
        {
            "rest" => AclBackend::Rest {
                url: std::env::var("ACL_REST_URL")
                    .map_err(|_| AclError::config_error("ACL_REST_URL not set"))?,
                token: std::env::var("ACL_REST_TOKEN")
                    .map_err(|_| AclError::config_error("ACL_REST_TOKEN not set"))?,
            },
            "redis" => AclBackend::Redis {
                url: std::env::var("ACL_REDIS_URL")
                    .or_else(|_| std::env::var("REDIS_URL"))
                    .map_err(|_| AclError::config_error("ACL_REDIS_URL or REDIS_URL must be set"))?,
            },
            "memory" => AclBackend::Memory,
            other => {
                return Err(AclError::config_error(format!(
                    "Unknown ACL_BACKEND '{}' (expected rest, redis or memory)",
                    other
                )))
            }
        };

        Ok(Self {
            backend,
            key_prefix: std::env::var("ACL_KEY_PREFIX").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("ACL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        })
    }
}

/// Build the configured access-control client.
pub fn connect(config: &AclConfig) -> AclResult<Arc<dyn AccessControl>> {
    info!(
        backend = config.backend.name(),
        key_prefix = %config.key_prefix,
        "Configuring access-control store"
    );

    let acl: Arc<dyn AccessControl> = match &config.backend {
        AclBackend::Rest { url, token } => Arc::new(RestAccessControl::new(
            url.clone(),
            token.clone(),
            config.key_prefix.clone(),
            config.timeout,
        )?),
        AclBackend::Redis { url } => {
            Arc::new(RedisAccessControl::new(url, config.key_prefix.clone())?)
        }
        AclBackend::Memory => Arc::new(MemoryAccessControl::new()),
    };

    Ok(acl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "ACL_BACKEND",
            "ACL_REST_URL",
            "ACL_REST_TOKEN",
            "ACL_REDIS_URL",
            "REDIS_URL",
            "ACL_KEY_PREFIX",
            "ACL_TIMEOUT_SECS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_rest_is_default_backend() {
        clear_env();
        std::env::set_var("ACL_REST_URL", "https://acl.example.com");
        std::env::set_var("ACL_REST_TOKEN", "t0k");

        let config = AclConfig::from_env().unwrap();
        assert_eq!(
            config.backend,
            AclBackend::Rest {
                url: "https://acl.example.com".to_string(),
                token: "t0k".to_string(),
            }
        );
        assert_eq!(config.timeout, Duration::from_secs(10));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_rest_requires_token() {
        clear_env();
        std::env::set_var("ACL_REST_URL", "https://acl.example.com");
        assert!(matches!(AclConfig::from_env(), Err(AclError::ConfigError(_))));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_redis_falls_back_to_redis_url() {
        clear_env();
        std::env::set_var("ACL_BACKEND", "redis");
        std::env::set_var("REDIS_URL", "redis://cache:6379");
        std::env::set_var("ACL_KEY_PREFIX", "avatar:");

        let config = AclConfig::from_env().unwrap();
        assert_eq!(
            config.backend,
            AclBackend::Redis {
                url: "redis://cache:6379".to_string()
            }
        );
        assert_eq!(config.key_prefix, "avatar:");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_backend() {
        clear_env();
        std::env::set_var("ACL_BACKEND", "etcd");
        let err = AclConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("etcd"));
        clear_env();
    }

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let config = AclConfig {
            backend: AclBackend::Memory,
            key_prefix: String::new(),
            timeout: Duration::from_secs(1),
        };
        let acl = connect(&config).unwrap();
        assert!(acl.add("abcd", "u1").await.unwrap());
        assert!(acl.is_member("abcd", "u1").await.unwrap());
    }
}
