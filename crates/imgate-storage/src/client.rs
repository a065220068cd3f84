//! S3-compatible object store client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{StorageError, StorageResult};
use crate::metrics::record_request;
use crate::signer::{Credentials, ObjectRequest, SigV4Signer, SignedRequest};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint (e.g. `https://<account>.r2.cloudflarestorage.com`)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Prefix prepended to every object key
    pub key_prefix: String,
    /// Address the bucket as `endpoint/bucket/key` instead of `bucket.endpoint/key`
    pub force_path_style: bool,
    /// Request timeout
    pub timeout: Duration,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
            key_prefix: std::env::var("S3_KEY_PREFIX").unwrap_or_default(),
            force_path_style: std::env::var("S3_FORCE_PATH_STYLE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            timeout: Duration::from_secs(
                std::env::var("S3_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }
}

/// An object fetched from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    /// `Content-Type` reported by the store, if any.
    pub content_type: Option<String>,
}

/// Object store operations used by the gateway.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Missing objects yield [`StorageError::NotFound`].
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject>;

    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()>;

    /// Remove an object.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;
}

/// Object store client speaking the S3 REST API with SigV4 signatures.
#[derive(Clone)]
pub struct S3Client {
    http: Client,
    signer: SigV4Signer,
    endpoint: Url,
    bucket: String,
    key_prefix: String,
    force_path_style: bool,
}

impl S3Client {
    /// Create a new client from configuration.
    pub fn new(config: S3Config) -> StorageResult<Self> {
        let endpoint = Url::parse(&config.endpoint_url)
            .map_err(|e| StorageError::config_error(format!("Invalid S3_ENDPOINT_URL: {}", e)))?;
        if endpoint.host_str().is_none() {
            return Err(StorageError::config_error("S3_ENDPOINT_URL has no host"));
        }
        if config.bucket_name.is_empty() {
            return Err(StorageError::config_error("S3_BUCKET_NAME cannot be empty"));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("imgate-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StorageError::Network)?;

        let signer = SigV4Signer::new(
            Credentials::new(config.access_key_id, config.secret_access_key),
            config.region,
        );

        info!(
            endpoint = %endpoint,
            bucket = %config.bucket_name,
            region = %signer.region(),
            "Configured object store client"
        );

        Ok(Self {
            http,
            signer,
            endpoint,
            bucket: config.bucket_name,
            key_prefix: config.key_prefix,
            force_path_style: config.force_path_style,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env()?)
    }

    /// URL addressing `key` in the configured bucket.
    pub fn object_url(&self, key: &str) -> StorageResult<Url> {
        let full_key = format!("{}{}", self.key_prefix, key);
        let encoded_key = full_key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let mut url = self.endpoint.clone();
        let base_path = url.path().trim_end_matches('/').to_string();

        if self.force_path_style {
            url.set_path(&format!("{}/{}/{}", base_path, self.bucket, encoded_key));
        } else {
            let host = url
                .host_str()
                .ok_or_else(|| StorageError::InvalidUrl(self.endpoint.to_string()))?
                .to_string();
            url.set_host(Some(&format!("{}.{}", self.bucket, host)))
                .map_err(|e| StorageError::InvalidUrl(e.to_string()))?;
            url.set_path(&format!("{}/{}", base_path, encoded_key));
        }

        url.set_query(None);
        Ok(url)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: ObjectRequest,
    ) -> StorageResult<reqwest::Response> {
        let SignedRequest {
            method,
            url,
            host,
            content_sha256,
            amz_date,
            authorization,
            content_type,
            body,
        } = self.signer.sign(request, Utc::now())?;

        debug!(operation, %url, "Sending object store request");

        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(HOST, host)
            .header("x-amz-content-sha256", content_sha256)
            .header("x-amz-date", amz_date)
            .header(AUTHORIZATION, authorization);

        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if method == Method::PUT || !body.is_empty() {
            builder = builder.body(body);
        }

        let start = Instant::now();
        let result = builder.send().await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(response) => {
                record_request(operation, Some(response.status().as_u16()), elapsed);
                Ok(response)
            }
            Err(e) => {
                record_request(operation, None, elapsed);
                warn!(operation, error = %e, "Object store request failed");
                Err(StorageError::Network(e))
            }
        }
    }

    async fn upstream_error(response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        StorageError::upstream(status, detail.trim())
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        let url = self.object_url(key)?;
        let response = self.send("get_object", ObjectRequest::get(url)).await?;

        match response.status() {
            status if status.is_success() => {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                let body = response.bytes().await?;

                debug!(key, bytes = body.len(), "Fetched object");
                Ok(StoredObject { body, content_type })
            }
            StatusCode::NOT_FOUND => Err(StorageError::not_found(key)),
            _ => Err(Self::upstream_error(response).await),
        }
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        let url = self.object_url(key)?;
        let size = body.len();
        let response = self
            .send("put_object", ObjectRequest::put(url, body, content_type))
            .await?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        info!(key, bytes = size, content_type, "Uploaded object");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let url = self.object_url(key)?;
        let response = self.send("delete_object", ObjectRequest::delete(url)).await?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        info!(key, "Deleted object");
        Ok(())
    }
}
