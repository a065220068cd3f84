//! Access-control set store clients.
//!
//! Every stored image has a set of user IDs allowed to read and manage it.
//! This crate provides:
//! - The `AccessControl` capability trait used by the gateway
//! - A REST client for Upstash-style set stores
//! - A direct Redis client
//! - An in-memory store for local development and tests

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod redis_store;
pub mod rest;


use async_trait::async_trait;

pub use config::{connect, AclBackend, AclConfig};
pub use error::{AclError, AclResult};
pub use memory::MemoryAccessControl;
pub use redis_store::RedisAccessControl;
pub use rest::RestAccessControl;

/// Membership operations on the per-image grant sets.
///
/// Each call has three outcomes: `Ok(true)`, `Ok(false)` and `Err(_)` when the
/// backend could not be reached or answered with a failure. Callers decide how
/// to treat errors; the gateway denies access on read errors.
///
/// Operations are assumed atomic at the backend. Implementations do not lock
/// or retry.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Whether `user_id` holds a grant for `file_hash`.
    async fn is_member(&self, file_hash: &str, user_id: &str) -> AclResult<bool>;

    /// Grant `user_id` access to `file_hash`. Returns whether the grant is new.
    async fn add(&self, file_hash: &str, user_id: &str) -> AclResult<bool>;

    /// Revoke a grant. Returns whether a grant was removed.
    async fn remove(&self, file_hash: &str, user_id: &str) -> AclResult<bool>;

    /// Number of users holding a grant for `file_hash`.
    async fn member_count(&self, file_hash: &str) -> AclResult<u64>;
}
