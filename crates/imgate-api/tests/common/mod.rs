//! Shared fixtures for gateway integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use imgate_acl::{AccessControl, AclError, AclResult, MemoryAccessControl};
use imgate_api::{create_router, AppState, GatewayConfig};
use imgate_storage::{ObjectStore, StorageError, StorageResult, StoredObject};
use tokio::sync::Semaphore;
use tower::ServiceExt;

pub const TOKEN: &str = "test-token";

/// Object store kept in memory, counting every call.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_puts: AtomicBool,
    pub fail_deletes: AtomicBool,
    get_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryObjectStore {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn body(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|object| object.body.clone())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Make every later `get_object` wait for a permit on the returned
    /// semaphore after it has read the object.
    pub fn hold_gets(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.get_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        let object = self.objects.lock().unwrap().get(key).cloned();
        self.gets.fetch_add(1, Ordering::SeqCst);

        let gate = self.get_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        object.ok_or_else(|| StorageError::not_found(key))
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::upstream(503, "SlowDown"));
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::upstream(500, "InternalError"));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Access-control backend that is always unreachable.
pub struct FailingAccessControl;

#[async_trait]
impl AccessControl for FailingAccessControl {
    async fn is_member(&self, _file_hash: &str, _user_id: &str) -> AclResult<bool> {
        Err(AclError::from_http_status(503, "unavailable"))
    }

    async fn add(&self, _file_hash: &str, _user_id: &str) -> AclResult<bool> {
        Err(AclError::from_http_status(503, "unavailable"))
    }

    async fn remove(&self, _file_hash: &str, _user_id: &str) -> AclResult<bool> {
        Err(AclError::from_http_status(503, "unavailable"))
    }

    async fn member_count(&self, _file_hash: &str) -> AclResult<u64> {
        Err(AclError::from_http_status(503, "unavailable"))
    }
}

/// In-memory access control whose `remove` and `member_count` can be made to fail.
#[derive(Default)]
pub struct FlakyAccessControl {
    inner: MemoryAccessControl,
    pub fail_remove: AtomicBool,
    pub fail_count: AtomicBool,
}

#[async_trait]
impl AccessControl for FlakyAccessControl {
    async fn is_member(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        self.inner.is_member(file_hash, user_id).await
    }

    async fn add(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        self.inner.add(file_hash, user_id).await
    }

    async fn remove(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(AclError::from_http_status(503, "unavailable"));
        }
        self.inner.remove(file_hash, user_id).await
    }

    async fn member_count(&self, file_hash: &str) -> AclResult<u64> {
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(AclError::from_http_status(503, "unavailable"));
        }
        self.inner.member_count(file_hash).await
    }
}

pub struct TestGateway {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryObjectStore>,
    pub acl: Arc<dyn AccessControl>,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with(GatewayConfig::default(), Arc::new(MemoryAccessControl::new()))
    }

    pub fn with_max_upload(max_upload_bytes: usize) -> Self {
        Self::with(
            GatewayConfig {
                max_upload_bytes,
                ..GatewayConfig::default()
            },
            Arc::new(MemoryAccessControl::new()),
        )
    }

    pub fn with_acl(acl: Arc<dyn AccessControl>) -> Self {
        Self::with(GatewayConfig::default(), acl)
    }

    fn with(config: GatewayConfig, acl: Arc<dyn AccessControl>) -> Self {
        let config = GatewayConfig {
            upload_token: TOKEN.to_string(),
            ..config
        };
        let store = Arc::new(MemoryObjectStore::default());
        let state = AppState::from_parts(config, store.clone(), acl.clone(), None);
        let app = create_router(state.clone(), None);
        Self {
            app,
            state,
            store,
            acl,
        }
    }

    /// Send a request, then wait for the background work it scheduled.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        let response = self.send_now(request).await;
        self.drain().await;
        response
    }

    /// Send a request without waiting for its background work.
    pub async fn send_now(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn drain(&self) {
        self.state.background.close();
        self.state.background.wait().await;
        self.state.background.reopen();
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn put(&self, uri: &str, content_type: &str, body: &'static [u8]) -> Response<Body> {
        self.send(
            Request::put(uri)
                .header("authorization", format!("Bearer {}", TOKEN))
                .header("content-type", content_type)
                .header("content-length", body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::delete(uri)
                .header("authorization", format!("Bearer {}", TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn detail(response: Response<Body>) -> String {
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    body["detail"].as_str().unwrap().to_string()
}
