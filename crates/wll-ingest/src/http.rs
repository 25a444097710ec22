//! HTTP client for the WLL local API

use crate::{IngestError, IngestResult};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use wll_core::{check_device_error, BroadcastLease, ObservationPacket};

pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: RETRY_ATTEMPTS,
            delay: RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: reqwest::Client,
    base: Url,
    retry: RetryPolicy,
}

impl DeviceClient {
    /// `host` is a hostname or IP, optionally with `:port`
    pub fn new(host: &str, timeout: Duration) -> IngestResult<Self> {
        let base = Url::parse(&format!("http://{}/", host.trim()))
            .map_err(|e| IngestError::ConfigurationError(format!("invalid host {host:?}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            client,
            base,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET /v1/current_conditions`
    pub async fn request_current(&self) -> IngestResult<ObservationPacket> {
        let url = self.endpoint("v1/current_conditions")?;
        self.retrying("current conditions request", || {
            let url = url.clone();
            async move {
                let body = self.get_json(url).await?;
                Ok(ObservationPacket::from_conditions_response(&body)?)
            }
        })
        .await
    }

    /// `GET /v1/real_time?duration=N`, asking the device to broadcast for `duration`
    pub async fn start_broadcast(&self, duration: Duration) -> IngestResult<BroadcastLease> {
        let mut url = self.endpoint("v1/real_time")?;
        url.query_pairs_mut()
            .append_pair("duration", &duration.as_secs().to_string());

        let lease = self
            .retrying("broadcast request", || {
                let url = url.clone();
                async move {
                    let body = self.get_json(url).await?;
                    Ok(BroadcastLease::from_response(&body)?)
                }
            })
            .await?;
        debug!(
            "Device granted broadcast on port {} for {}s",
            lease.broadcast_port, lease.duration
        );
        Ok(lease)
    }

    fn endpoint(&self, path: &str) -> IngestResult<Url> {
        self.base
            .join(path)
            .map_err(|e| IngestError::ConfigurationError(e.to_string()))
    }

    async fn get_json(&self, url: Url) -> IngestResult<Value> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        // the device reports its own errors in the body, whatever the status
        if !status.is_success() {
            if let Ok(value) = serde_json::from_slice::<Value>(&body) {
                check_device_error(&value)?;
            }
            return Err(IngestError::CommunicationError(format!(
                "device answered with HTTP status {status}"
            )));
        }

        serde_json::from_slice(&body).map_err(|e| IngestError::InvalidPacket(e.to_string()))
    }

    async fn retrying<T, F, Fut>(&self, what: &str, mut op: F) -> IngestResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IngestResult<T>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what, attempt, attempts, self.retry.delay, e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> IngestError {
    if e.is_timeout() {
        IngestError::Timeout
    } else {
        IngestError::CommunicationError(e.to_string())
    }
}
