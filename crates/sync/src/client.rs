//! Worker-side client of the synchronizer

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use spectree_common::{AggregateReport, WorkerReport};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    BeginRequest, BeginResponse, EndResponse, HealthResponse, AGGREGATE_PATH, BEGIN_PATH, END_PATH, UP_PATH,
};

/// HTTP client bound to one synchronizer
#[derive(Debug, Clone)]
pub struct SyncClient {
    base_url: String,
    http: reqwest::Client,
}

impl SyncClient {
    /// Create a client for the synchronizer at `base_url` (e.g. `http://127.0.0.1:9000`)
    pub fn new(base_url: &str) -> SyncResult<Self> {
        // No overall request timeout: the aggregate request blocks until every
        // worker has reported.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Single readiness probe
    pub async fn is_up(&self) -> bool {
        match self
            .http
            .post(self.url(UP_PATH))
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Probe of {} failed: {}", self.base_url, e);
                false
            }
        }
    }

    /// Readiness probe with the synchronizer's self-description
    pub async fn health(&self) -> SyncResult<HealthResponse> {
        let resp = self
            .http
            .get(self.url(UP_PATH))
            .timeout(Duration::from_secs(2))
            .send()
            .await?;
        Self::decode(UP_PATH, resp).await
    }

    /// Poll the readiness probe until it answers
    pub async fn wait_until_up(&self, attempts: usize, interval: Duration) -> SyncResult<()> {
        for attempt in 1..=attempts {
            if self.is_up().await {
                return Ok(());
            }
            if attempt == 1 {
                info!("Waiting for synchronizer at {}...", self.base_url);
            }
            sleep(interval).await;
        }

        warn!("Synchronizer at {} did not come up", self.base_url);
        Err(SyncError::Unreachable {
            host: self.base_url.clone(),
            attempts,
        })
    }

    /// Report that this worker is beginning; returns the agreed suite start
    pub async fn begin(&self, node: u32) -> SyncResult<DateTime<Utc>> {
        let resp = self
            .http
            .post(self.url(BEGIN_PATH))
            .json(&BeginRequest { node })
            .send()
            .await?;
        let begin: BeginResponse = Self::decode(BEGIN_PATH, resp).await?;
        Ok(begin.suite_started_at)
    }

    /// Submit this worker's end-of-shard report
    pub async fn end(&self, report: &WorkerReport) -> SyncResult<EndResponse> {
        let resp = self
            .http
            .post(self.url(END_PATH))
            .json(report)
            .send()
            .await?;
        Self::decode(END_PATH, resp).await
    }

    /// Fetch the grand total; blocks until every worker has reported
    pub async fn aggregate(&self) -> SyncResult<AggregateReport> {
        let resp = self.http.get(self.url(AGGREGATE_PATH)).send().await?;
        Self::decode(AGGREGATE_PATH, resp).await
    }

    async fn decode<T: DeserializeOwned>(endpoint: &str, resp: reqwest::Response) -> SyncResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::UnexpectedStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<T>().await?)
    }
}
