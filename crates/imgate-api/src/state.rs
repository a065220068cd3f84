//! Application state.

use std::sync::Arc;

use anyhow::Context;
use imgate_acl::{AccessControl, AclConfig};
use imgate_storage::{ObjectStore, S3Client, S3Config};
use tokio_util::task::TaskTracker;

use crate::cache::{CacheLayer, MemoryResponseCache};
use crate::config::GatewayConfig;
use crate::purge::PurgeClient;

/// Shared application state. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub storage: Arc<dyn ObjectStore>,
    pub acl: Arc<dyn AccessControl>,
    pub cache: CacheLayer,
    pub purge: Option<PurgeClient>,
    /// Background work (cache population, edge purge) drained at shutdown
    pub background: TaskTracker,
}

impl AppState {
    /// Create state with collaborators configured from the environment.
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let s3_config = S3Config::from_env().context("Invalid object store configuration")?;
        let storage = S3Client::new(s3_config).context("Failed to create object store client")?;

        let acl_config = AclConfig::from_env().context("Invalid access-control configuration")?;
        let acl = imgate_acl::connect(&acl_config)
            .context("Failed to create access-control client")?;

        let purge = config
            .purge
            .clone()
            .map(PurgeClient::new)
            .transpose()
            .context("Failed to create purge client")?;

        Ok(Self::from_parts(config, Arc::new(storage), acl, purge))
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        config: GatewayConfig,
        storage: Arc<dyn ObjectStore>,
        acl: Arc<dyn AccessControl>,
        purge: Option<PurgeClient>,
    ) -> Self {
        let background = TaskTracker::new();
        let cache = CacheLayer::new(
            Arc::new(MemoryResponseCache::new(config.cache_max_entries)),
            background.clone(),
        );

        Self {
            config: Arc::new(config),
            storage,
            acl,
            cache,
            purge,
            background,
        }
    }
}
