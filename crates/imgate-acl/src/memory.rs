//! In-process grant sets for local development and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AclResult;
use crate::AccessControl;

/// Grant sets held in memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryAccessControl {
    sets: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryAccessControl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessControl for MemoryAccessControl {
    async fn is_member(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let sets = self.sets.read().await;
        Ok(sets
            .get(file_hash)
            .is_some_and(|members| members.contains(user_id)))
    }

    async fn add(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let mut sets = self.sets.write().await;
        Ok(sets
            .entry(file_hash.to_string())
            .or_default()
            .insert(user_id.to_string()))
    }

    async fn remove(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let mut sets = self.sets.write().await;
        let Some(members) = sets.get_mut(file_hash) else {
            return Ok(false);
        };

        let removed = members.remove(user_id);
        // Redis drops empty sets; mirror that.
        if members.is_empty() {
            sets.remove(file_hash);
        }
        Ok(removed)
    }

    async fn member_count(&self, file_hash: &str) -> AclResult<u64> {
        let sets = self.sets.read().await;
        Ok(sets.get(file_hash).map_or(0, |members| members.len() as u64))
    }
}
