//! Direct Redis set store.

use std::time::Instant;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::error::{AclError, AclResult};
use crate::metrics::record_request;
use crate::AccessControl;

/// Grant sets stored as Redis sets, one per image.
pub struct RedisAccessControl {
    client: redis::Client,
    /// Reconnects on its own after the server drops the socket.
    conn: OnceCell<ConnectionManager>,
    key_prefix: String,
}

impl RedisAccessControl {
    /// Create a client. The connection is opened on first use.
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> AclResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            key_prefix: key_prefix.into(),
        })
    }

    fn set_key(&self, file_hash: &str) -> String {
        format!("{}{}", self.key_prefix, file_hash)
    }

    async fn connection(&self) -> AclResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_connection_manager())
            .await?;
        Ok(conn.clone())
    }

    fn observe<T>(operation: &'static str, start: Instant, result: &AclResult<T>) {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        record_request(operation, outcome, start.elapsed().as_secs_f64());
        if let Err(e) = result {
            warn!(operation, error = %e, "Redis access-control command failed");
        }
    }
}

#[async_trait]
impl AccessControl for RedisAccessControl {
    async fn is_member(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let start = Instant::now();
        let result = async {
            let mut conn = self.connection().await?;
            let member: bool = conn.sismember(self.set_key(file_hash), user_id).await?;
            Ok::<_, AclError>(member)
        }
        .await;
        Self::observe("is_member", start, &result);
        result
    }

    async fn add(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let start = Instant::now();
        let result = async {
            let mut conn = self.connection().await?;
            let added: i64 = conn.sadd(self.set_key(file_hash), user_id).await?;
            Ok::<_, AclError>(added > 0)
        }
        .await;
        Self::observe("add", start, &result);
        result
    }

    async fn remove(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let start = Instant::now();
        let result = async {
            let mut conn = self.connection().await?;
            let removed: i64 = conn.srem(self.set_key(file_hash), user_id).await?;
            Ok::<_, AclError>(removed > 0)
        }
        .await;
        Self::observe("remove", start, &result);
        result
    }

    async fn member_count(&self, file_hash: &str) -> AclResult<u64> {
        let start = Instant::now();
        let result = async {
            let mut conn = self.connection().await?;
            let count: u64 = conn.scard(self.set_key(file_hash)).await?;
            Ok::<_, AclError>(count)
        }
        .await;
        Self::observe("member_count", start, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        assert!(RedisAccessControl::new("not-a-redis-url", "").is_err());
    }

    #[test]
    fn test_set_key_uses_prefix() {
        let acl = RedisAccessControl::new("redis://localhost:6379", "avatar:").unwrap();
        assert_eq!(acl.set_key("abcd"), "avatar:abcd");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_grant_lifecycle() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let acl = RedisAccessControl::new(&url, "imgate-test:").unwrap();
        let hash = format!("lifecycle-{}", std::process::id());

        assert!(acl.add(&hash, "u1").await.unwrap());
        assert!(!acl.add(&hash, "u1").await.unwrap());
        assert!(acl.is_member(&hash, "u1").await.unwrap());
        assert_eq!(acl.member_count(&hash).await.unwrap(), 1);
        assert!(acl.remove(&hash, "u1").await.unwrap());
        assert_eq!(acl.member_count(&hash).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_survives_server_side_disconnect() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let acl = RedisAccessControl::new(&url, "imgate-test:").unwrap();
        let hash = format!("reconnect-{}", std::process::id());
        acl.add(&hash, "u1").await.unwrap();

        // Drop every client connection, including the one held by `acl`.
        let mut admin = redis::Client::open(url.as_str())
            .unwrap()
            .get_multiplexed_async_connection()
            .await
            .unwrap();
        let _: redis::RedisResult<()> = redis::cmd("CLIENT")
            .arg("KILL")
            .arg("TYPE")
            .arg("normal")
            .query_async(&mut admin)
            .await;

        let mut member = acl.is_member(&hash, "u1").await;
        for _ in 0..10 {
            if member.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            member = acl.is_member(&hash, "u1").await;
        }
        assert!(member.unwrap());
        acl.remove(&hash, "u1").await.unwrap();
    }
}
