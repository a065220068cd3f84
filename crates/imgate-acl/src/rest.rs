//! REST client for Upstash-style set stores.
//!
//! Commands are issued as `{base}/{command}/{key}[/{member}]` with bearer
//! authentication. Successful replies carry `{"result": <integer>}`; failures
//! carry `{"error": "..."}` with a non-2xx status.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AclError, AclResult};
use crate::metrics::record_request;
use crate::AccessControl;

#[derive(Debug, Deserialize)]
struct CommandReply {
    result: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// Set store reached over the Upstash REST protocol.
#[derive(Clone)]
pub struct RestAccessControl {
    http: Client,
    base_url: String,
    token: String,
    key_prefix: String,
}

impl RestAccessControl {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        key_prefix: impl Into<String>,
        timeout: Duration,
    ) -> AclResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AclError::config_error("REST base URL cannot be empty"));
        }

        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("imgate-acl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
            key_prefix: key_prefix.into(),
        })
    }

    fn set_key(&self, file_hash: &str) -> String {
        format!("{}{}", self.key_prefix, file_hash)
    }

    fn command_url(&self, command: &str, args: &[&str]) -> String {
        let mut url = format!("{}/{}", self.base_url, command);
        for arg in args {
            url.push('/');
            url.push_str(&urlencoding::encode(arg));
        }
        url
    }

    async fn execute(
        &self,
        operation: &'static str,
        method: Method,
        command: &str,
        args: &[&str],
    ) -> AclResult<i64> {
        let url = self.command_url(command, args);
        let start = Instant::now();

        let result = self.send(method, &url).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(AclError::RequestFailed { .. }) => "rejected",
            Err(_) => "error",
        };
        record_request(operation, outcome, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(operation, error = %e, "Access-control request failed");
        }
        result
    }

    async fn send(&self, method: Method, url: &str) -> AclResult<i64> {
        let response = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<CommandReply>(&body)
                .ok()
                .and_then(|reply| reply.error)
                .unwrap_or(body);
            return Err(AclError::from_http_status(status.as_u16(), detail));
        }

        let reply: CommandReply = serde_json::from_str(&body)
            .map_err(|e| AclError::invalid_response(format!("{}: {}", e, body)))?;

        match (reply.result, reply.error) {
            (_, Some(error)) => Err(AclError::invalid_response(error)),
            (Some(result), None) => {
                debug!(url, result, "Access-control command completed");
                Ok(result)
            }
            (None, None) => Err(AclError::invalid_response("reply has no result")),
        }
    }
}

#[async_trait]
impl AccessControl for RestAccessControl {
    async fn is_member(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let key = self.set_key(file_hash);
        let result = self
            .execute("is_member", Method::GET, "sismember", &[&key, user_id])
            .await?;
        Ok(result == 1)
    }

    async fn add(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let key = self.set_key(file_hash);
        let result = self
            .execute("add", Method::POST, "sadd", &[&key, user_id])
            .await?;
        Ok(result > 0)
    }

    async fn remove(&self, file_hash: &str, user_id: &str) -> AclResult<bool> {
        let key = self.set_key(file_hash);
        let result = self
            .execute("remove", Method::DELETE, "srem", &[&key, user_id])
            .await?;
        Ok(result > 0)
    }

    async fn member_count(&self, file_hash: &str) -> AclResult<u64> {
        let key = self.set_key(file_hash);
        let result = self
            .execute("member_count", Method::GET, "scard", &[&key])
            .await?;
        u64::try_from(result)
            .map_err(|_| AclError::invalid_response(format!("negative cardinality {}", result)))
    }
}
