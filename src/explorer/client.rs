use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use super::BlockSource;
use crate::config::ExplorerConfig;
use crate::error::ExplorerError;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{Block, Transaction};

/// HTTP client for an Esplora-compatible explorer API
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: Client,
    base_url: String,
}

impl ExplorerClient {
    pub fn new(config: &ExplorerConfig) -> Result<Self, ExplorerError> {
        let base_url = config.base_url();
        let timeout = config.timeout();

        LogContext::new("explorer_client", "initialization")
            .with_metadata("base_url", json!(base_url))
            .with_metadata("timeout_seconds", json!(config.timeout_seconds))
            .info("Initializing explorer client");

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and hand back the body of a successful response
    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ExplorerError> {
        let url = self.url(path);
        LogContext::new("explorer_client", "request")
            .with_metadata("url", json!(url))
            .trace("Sending explorer request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e, &url))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExplorerError::RateLimit { url });
        }
        if !status.is_success() {
            return Err(ExplorerError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e, &url))?;
        Ok(body.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ExplorerError> {
        let body = self.get_bytes(path).await?;
        serde_json::from_slice(&body).map_err(|e| ExplorerError::Decode {
            url: self.url(path),
            reason: e.to_string(),
        })
    }

    fn classify(&self, error: reqwest::Error, url: &str) -> ExplorerError {
        if error.is_timeout() {
            ExplorerError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_connect() {
            ExplorerError::Connection(format!("{}: {}", url, error))
        } else {
            ExplorerError::Http(error)
        }
    }

    async fn observed<T, F>(&self, endpoint: &str, request: F) -> Result<T, ExplorerError>
    where
        F: std::future::Future<Output = Result<T, ExplorerError>>,
    {
        let monitor = PerformanceMonitor::new("explorer_request").with_metadata("endpoint", json!(endpoint));
        let result = request.await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_explorer_call(endpoint, duration, result.is_ok());
        result
    }
}

#[async_trait]
impl BlockSource for ExplorerClient {
    async fn tip_height(&self) -> Result<u64, ExplorerError> {
        let path = "/blocks/tip/height";
        self.observed(path, async {
            let body = self.get_bytes(path).await?;
            let text = String::from_utf8_lossy(&body);
            text.trim().parse::<u64>().map_err(|e| ExplorerError::Decode {
                url: self.url(path),
                reason: format!("tip height {:?} is not an integer: {}", text.trim(), e),
            })
        })
        .await
    }

    async fn blocks(&self, start_height: u64) -> Result<Vec<Block>, ExplorerError> {
        let path = format!("/blocks/{}", start_height);
        self.observed(&path, self.get_json(&path)).await
    }

    async fn transactions(&self, block_id: &str, start_index: usize) -> Result<Vec<Transaction>, ExplorerError> {
        let path = format!("/block/{}/txs/{}", block_id, start_index);
        self.observed(&path, self.get_json(&path)).await
    }
}
