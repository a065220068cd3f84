//! Best-effort edge cache purge.

use std::time::Duration;

use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::config::PurgeConfig;
use crate::metrics;

#[derive(Serialize)]
struct PurgeRequest<'a> {
    files: [&'a str; 1],
}

/// Client for a CDN purge endpoint accepting `{"files": [url, ...]}`.
#[derive(Clone)]
pub struct PurgeClient {
    http: reqwest::Client,
    config: PurgeConfig,
}

impl PurgeClient {
    pub fn new(config: PurgeConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    /// Public URL for a request path.
    pub fn public_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.config.public_base_url, path_and_query)
    }

    /// Purge one URL. Failures are logged and swallowed.
    pub async fn purge(&self, path_and_query: &str) {
        let url = self.public_url(path_and_query);
        let mut request = self
            .http
            .post(&self.config.url)
            .json(&PurgeRequest {
                files: [url.as_str()],
            });
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                metrics::record_purge("ok");
                debug!(url = %url, "Purged edge cache");
            }
            Ok(response) => {
                metrics::record_purge("rejected");
                warn!(url = %url, status = %response.status(), "Edge purge rejected");
            }
            Err(e) => {
                metrics::record_purge("error");
                warn!(url = %url, error = %e, "Edge purge failed");
            }
        }
    }

    /// Schedule a purge on the background tracker.
    pub fn schedule(&self, background: &TaskTracker, path_and_query: &str) {
        let client = self.clone();
        let path = path_and_query.to_string();
        background.spawn(async move { client.purge(&path).await });
    }
}
