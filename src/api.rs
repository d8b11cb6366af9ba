//! Backend metrics API client
//!
//! Posts daily snapshots to the backend. Both endpoints are fire-and-forget:
//! only the status code is checked, the response body is ignored.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::PauseError;
use crate::types::{DailySnapshot, UsageSnapshot};
use crate::{MINDPAUSE_VERSION, PRODUCER_NAME};

pub const INTERACTIONS_PATH: &str = "metrics/interactions";
pub const USAGE_PATH: &str = "metrics/usage";

/// Sink for snapshots on the backend
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn post_interactions(
        &self,
        user_id: &str,
        snapshot: &DailySnapshot,
    ) -> Result<(), PauseError>;

    async fn post_usage(&self, user_id: &str, usage: &UsageSnapshot) -> Result<(), PauseError>;
}

/// reqwest-backed implementation of [`MetricsApi`]
#[derive(Debug, Clone)]
pub struct HttpMetricsApi {
    client: Client,
    base_url: Url,
    user_query_key: String,
}

impl HttpMetricsApi {
    /// Build a client from API settings
    pub fn new(config: &ApiConfig) -> Result<Self, PauseError> {
        Self::with_timeout(&config.base_url, &config.user_query_key, config.request_timeout())
    }

    pub fn with_timeout(
        base_url: &str,
        user_query_key: &str,
        timeout: Duration,
    ) -> Result<Self, PauseError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| PauseError::Config(format!("invalid base url {base_url}: {e}")))?;

        // Url::join drops the last path segment unless it ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{PRODUCER_NAME}/{MINDPAUSE_VERSION}"))
            .build()?;

        Ok(Self {
            client,
            base_url,
            user_query_key: user_query_key.to_string(),
        })
    }

    /// Endpoint URL with the user identifier as query parameter
    pub fn endpoint(&self, path: &str, user_id: &str) -> Result<Url, PauseError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| PauseError::Config(format!("invalid endpoint {path}: {e}")))?;
        url.query_pairs_mut()
            .append_pair(&self.user_query_key, user_id);
        Ok(url)
    }

    async fn post_json<T: Serialize + Sync>(
        &self,
        path: &str,
        user_id: &str,
        body: &T,
    ) -> Result<(), PauseError> {
        let url = self.endpoint(path, user_id)?;
        debug!(%url, "posting metrics");

        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        debug!(path, %status, "metrics response");

        if status.is_success() {
            Ok(())
        } else {
            Err(PauseError::Http {
                status: status.as_u16(),
                endpoint: path.to_string(),
            })
        }
    }
}

#[async_trait]
impl MetricsApi for HttpMetricsApi {
    async fn post_interactions(
        &self,
        user_id: &str,
        snapshot: &DailySnapshot,
    ) -> Result<(), PauseError> {
        self.post_json(INTERACTIONS_PATH, user_id, snapshot).await
    }

    async fn post_usage(&self, user_id: &str, usage: &UsageSnapshot) -> Result<(), PauseError> {
        self.post_json(USAGE_PATH, user_id, usage).await
    }
}
