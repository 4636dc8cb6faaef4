//! REST client for the wallet admin configuration API
//!
//! Reads are retried on transport failures with exponential backoff.
//! Writes are sent exactly once and tagged with an `X-Request-Id` so the
//! backend log can be correlated with ours.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::{Ack, ConfigService, ThresholdSettings, ThresholdsUpdate};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::limits::{ChainId, GlobalLimits, LimitRecord};
use crate::settings::snapshot::{GlobalStatus, ScalarToggle, ToggleValue};

const GLOBAL_STATUS_PATH: &str = "withdrawals/global-status";
const GLOBAL_STATUS_TOGGLE_PATH: &str = "withdrawals/global-status/toggle";
const THRESHOLDS_PATH: &str = "withdrawals/thresholds";
const CHAIN_LIMITS_PATH: &str = "withdrawals/chain-limits";
const GLOBAL_LIMITS_PATH: &str = "withdrawals/global-limits";
const VALIDATION_PATH: &str = "withdrawals/validation";
const SETTINGS_PATH: &str = "settings";

/// Backoff for reads: intervals grow from `base_ms` up to 8x, and the total
/// wait is capped at `base_ms * 2^max_retries`
fn retry_policy(base_ms: u64, max_retries: u32) -> ExponentialBackoff {
    let base = base_ms.max(1);
    let budget = 1u64
        .checked_shl(max_retries.min(10))
        .unwrap_or(u64::MAX);
    ExponentialBackoff {
        initial_interval: Duration::from_millis(base),
        max_interval: Duration::from_millis(base.saturating_mul(8)),
        max_elapsed_time: Some(Duration::from_millis(base.saturating_mul(budget))),
        ..Default::default()
    }
}

const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Debug, Serialize)]
struct ToggleStatusRequest<'a> {
    reason: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnabledBody {
    enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ValueBody {
    value: ToggleValue,
}

/// Config backend over HTTP
pub struct HttpConfigService {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
    max_retries: u32,
    retry_base_delay_ms: u64,
}

impl HttpConfigService {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("Invalid backend base_url: {}", e)))?;
        // Url::join drops the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        debug!("Config backend client initialized for {}", base_url);

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
        })
    }

    fn endpoint(&self, path: &str, brand: Option<&str>) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", path, e)))?;
        if let Some(brand) = brand {
            url.query_pairs_mut().append_pair("brandId", brand);
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET with retry on transport failures
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        if self.max_retries == 0 {
            return self.execute(self.client.get(url)).await;
        }

        let backoff = retry_policy(self.retry_base_delay_ms, self.max_retries);

        retry(backoff, || async {
            match self.execute(self.client.get(url.clone())).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!("Retryable backend error on GET {}: {}", url.path(), e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Single-attempt write
    async fn send_json<B, T>(&self, method: Method, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request_id = Uuid::new_v4().to_string();
        debug!("{} {} (request {})", method, url.path(), request_id);

        let request = self
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id)
            .json(body);
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::Deserialization(format!("{} (body: {})", e, preview(&body)))
        })
    }
}

/// Map a non-2xx response to the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<Ack>(body)
        .ok()
        .map(|ack| ack.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                preview(body)
            }
        });

    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Error::Transport(format!("HTTP {}: {}", status.as_u16(), message))
    } else {
        Error::RemoteRejection(message)
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

#[async_trait]
impl ConfigService for HttpConfigService {
    async fn global_status(&self, brand: Option<&str>) -> Result<GlobalStatus> {
        self.get_json(self.endpoint(GLOBAL_STATUS_PATH, brand)?).await
    }

    async fn toggle_global_status(&self, brand: Option<&str>, reason: &str) -> Result<Ack> {
        let url = self.endpoint(GLOBAL_STATUS_TOGGLE_PATH, brand)?;
        self.send_json(Method::POST, url, &ToggleStatusRequest { reason })
            .await
    }

    async fn thresholds(&self, brand: Option<&str>) -> Result<ThresholdSettings> {
        self.get_json(self.endpoint(THRESHOLDS_PATH, brand)?).await
    }

    async fn update_thresholds(
        &self,
        brand: Option<&str>,
        update: &ThresholdsUpdate,
    ) -> Result<Ack> {
        let url = self.endpoint(THRESHOLDS_PATH, brand)?;
        self.send_json(Method::PUT, url, update).await
    }

    async fn chain_limits(&self, brand: Option<&str>) -> Result<HashMap<ChainId, LimitRecord>> {
        self.get_json(self.endpoint(CHAIN_LIMITS_PATH, brand)?).await
    }

    async fn chain_limit(&self, brand: Option<&str>, chain: &str) -> Result<LimitRecord> {
        let mut url = self.endpoint(CHAIN_LIMITS_PATH, brand)?;
        url.query_pairs_mut().append_pair("chainId", chain);
        self.get_json(url).await
    }

    async fn update_chain_limits(
        &self,
        brand: Option<&str>,
        chain: &str,
        limits: LimitRecord,
    ) -> Result<Ack> {
        let url = self.endpoint(&format!("{}/{}", CHAIN_LIMITS_PATH, chain), brand)?;
        self.send_json(Method::PUT, url, &limits).await
    }

    async fn global_limits(&self, brand: Option<&str>) -> Result<GlobalLimits> {
        self.get_json(self.endpoint(GLOBAL_LIMITS_PATH, brand)?).await
    }

    async fn update_global_limits(
        &self,
        brand: Option<&str>,
        limits: GlobalLimits,
    ) -> Result<GlobalLimits> {
        let url = self.endpoint(GLOBAL_LIMITS_PATH, brand)?;
        self.send_json(Method::PUT, url, &limits).await
    }

    async fn validation_enabled(&self, brand: Option<&str>) -> Result<bool> {
        let body: EnabledBody = self.get_json(self.endpoint(VALIDATION_PATH, brand)?).await?;
        Ok(body.enabled)
    }

    async fn toggle_validation(&self, brand: Option<&str>, enabled: bool) -> Result<bool> {
        let url = self.endpoint(VALIDATION_PATH, brand)?;
        let body: EnabledBody = self
            .send_json(Method::PUT, url, &EnabledBody { enabled })
            .await?;
        Ok(body.enabled)
    }

    async fn toggle(&self, brand: Option<&str>, toggle: ScalarToggle) -> Result<ToggleValue> {
        let url = self.endpoint(&format!("{}/{}", SETTINGS_PATH, toggle.as_str()), brand)?;
        let body: ValueBody = self.get_json(url).await?;
        Ok(body.value)
    }

    async fn set_toggle(
        &self,
        brand: Option<&str>,
        toggle: ScalarToggle,
        value: ToggleValue,
    ) -> Result<ToggleValue> {
        let url = self.endpoint(&format!("{}/{}", SETTINGS_PATH, toggle.as_str()), brand)?;
        let body: ValueBody = self
            .send_json(Method::PUT, url, &ValueBody { value })
            .await?;
        Ok(body.value)
    }
}
