//! Shared response cache.
//!
//! Responses are keyed by the request URL (path and query) and stored whole.
//! Every key is also indexed under the grant it was served for, the
//! `(user_id, file_hash)` pair, so one invalidation drops every URL variant
//! of that grant. Population runs on the background task tracker so the
//! client response is never delayed; invalidation is awaited by the mutating
//! handlers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use imgate_models::ImagePath;
use tokio::sync::{Mutex, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::metrics;

/// A complete HTTP response held in the cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    /// Same status and headers with the body dropped, as sent for HEAD.
    pub fn without_body(self) -> Self {
        let mut headers = self.headers;
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        Self {
            status: self.status,
            headers,
            body: Bytes::new(),
        }
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Storage backend for cached responses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<CachedResponse>;

    async fn put(&self, key: &str, response: CachedResponse, ttl: Duration);

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> bool;
}

struct Entry {
    response: CachedResponse,
    seq: u64,
    expires_at: Instant,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Insertion order. Stale items (overwritten or deleted keys) are
    /// skipped on eviction and compacted away once they dominate.
    order: VecDeque<(String, u64)>,
    next_seq: u64,
}

impl Entries {
    fn evict_oldest(&mut self) -> bool {
        while let Some((key, seq)) = self.order.pop_front() {
            if self.map.get(&key).is_some_and(|entry| entry.seq == seq) {
                self.map.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact(&mut self) {
        let map = &self.map;
        self.order
            .retain(|(key, seq)| map.get(key).is_some_and(|entry| entry.seq == *seq));
    }
}

/// In-process cache with per-entry expiry and an entry cap.
///
/// At capacity the oldest insertion is evicted.
pub struct MemoryResponseCache {
    entries: RwLock<Entries>,
    max_entries: usize,
}

impl MemoryResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Option<CachedResponse> {
        let entries = self.entries.read().await;
        entries
            .map
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.response.clone())
    }

    async fn put(&self, key: &str, response: CachedResponse, ttl: Duration) {
        let mut entries = self.entries.write().await;

        if !entries.map.contains_key(key) {
            let mut evicted = 0;
            while entries.map.len() >= self.max_entries && entries.evict_oldest() {
                evicted += 1;
            }
            if evicted > 0 {
                debug!(evicted, "Response cache at capacity");
            }
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.order.push_back((key.to_string(), seq));
        entries.map.insert(
            key.to_string(),
            Entry {
                response,
                seq,
                expires_at: Instant::now() + ttl,
            },
        );

        if entries.order.len() > self.max_entries.saturating_mul(2) {
            entries.compact();
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.map.remove(key).is_some()
    }
}

/// Keys cached for one grant.
#[derive(Default)]
struct GrantSlot {
    keys: HashSet<String>,
    /// Epoch of the invalidation that retired this slot, or the index floor
    /// when the slot was created.
    invalidated_at: u64,
    retired: bool,
}

#[derive(Default)]
struct GrantIndex {
    slots: HashMap<String, Arc<Mutex<GrantSlot>>>,
    /// Highest invalidation epoch whose slot has been dropped.
    floor: u64,
}

/// Outcome of a cache lookup.
pub enum Lookup {
    Hit(CachedResponse),
    /// Miss. The fill must be handed back to [`CacheLayer::populate`].
    Miss(CacheFill),
}

/// Permission to cache one response, valid until the grant is invalidated.
#[derive(Debug)]
pub struct CacheFill {
    grant: String,
    key: String,
    epoch: u64,
}

fn grant_id(image: &ImagePath) -> String {
    format!("{}/{}", image.user_id, image.file_hash)
}

/// Cache-aside wrapper used by the handlers.
#[derive(Clone)]
pub struct CacheLayer {
    cache: Arc<dyn ResponseCache>,
    index: Arc<Mutex<GrantIndex>>,
    epoch: Arc<AtomicU64>,
    background: TaskTracker,
}

impl CacheLayer {
    pub fn new(cache: Arc<dyn ResponseCache>, background: TaskTracker) -> Self {
        Self {
            cache,
            index: Arc::new(Mutex::new(GrantIndex::default())),
            epoch: Arc::new(AtomicU64::new(0)),
            background,
        }
    }

    /// Look up `key`, served for `image`'s grant.
    ///
    /// Must run before the access check so that a fill racing a revocation
    /// is discarded.
    pub async fn lookup(&self, image: &ImagePath, key: &str) -> Lookup {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let hit = self.cache.get(key).await;
        metrics::record_cache_lookup(hit.is_some());
        match hit {
            Some(response) => Lookup::Hit(response),
            None => Lookup::Miss(CacheFill {
                grant: grant_id(image),
                key: key.to_string(),
                epoch,
            }),
        }
    }

    /// Store `response` in the background. Returns immediately.
    ///
    /// The write is dropped if the grant was invalidated after the lookup
    /// that produced `fill`.
    pub fn populate(&self, fill: CacheFill, response: CachedResponse, ttl: Duration) {
        if self.background.is_closed() {
            warn!(key = %fill.key, "Background tracker closed, skipping cache population");
            return;
        }

        let layer = self.clone();
        self.background.spawn(async move {
            let status = response.status.as_u16();
            let key = fill.key.clone();
            if layer.store(fill, response, ttl).await {
                metrics::record_cache_store(status);
                debug!(key = %key, status, "Cached response");
            } else {
                metrics::record_cache_fill_discarded();
                debug!(key = %key, status, "Grant changed since lookup, not caching");
            }
        });
    }

    async fn store(&self, fill: CacheFill, response: CachedResponse, ttl: Duration) -> bool {
        loop {
            let slot = {
                let mut index = self.index.lock().await;
                match index.slots.get(&fill.grant) {
                    Some(slot) => Arc::clone(slot),
                    None if index.floor > fill.epoch => return false,
                    None => {
                        let slot = Arc::new(Mutex::new(GrantSlot {
                            invalidated_at: index.floor,
                            ..GrantSlot::default()
                        }));
                        index.slots.insert(fill.grant.clone(), Arc::clone(&slot));
                        slot
                    }
                }
            };

            let mut slot = slot.lock().await;
            if slot.retired {
                // Replaced by a newer slot, or none; resolve again.
                continue;
            }
            if slot.invalidated_at > fill.epoch {
                return false;
            }
            self.cache.put(&fill.key, response, ttl).await;
            slot.keys.insert(fill.key);
            return true;
        }
    }

    /// Drop every cached URL served for `image`'s grant and cancel pending
    /// fills for it. Completes before returning. Returns the dropped keys.
    pub async fn invalidate(&self, image: &ImagePath) -> Vec<String> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = {
            let mut index = self.index.lock().await;
            index.floor = index.floor.max(epoch);
            index.slots.remove(&grant_id(image))
        };

        let keys: Vec<String> = match slot {
            Some(slot) => {
                let mut slot = slot.lock().await;
                slot.retired = true;
                slot.invalidated_at = epoch;
                let keys = slot.keys.drain().collect();
                keys
            }
            None => Vec::new(),
        };

        for key in &keys {
            self.cache.delete(key).await;
        }

        metrics::record_cache_invalidation();
        debug!(grant = %grant_id(image), removed = keys.len(), "Invalidated cached responses");
        keys
    }
}
