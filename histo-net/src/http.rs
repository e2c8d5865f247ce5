// histo-net/src/http.rs
use std::time::Duration;

use async_trait::async_trait;
use histo_common::config::Config;
use histo_common::error::{HistoError, Result};
use histo_common::model::{JobCommand, RemoteSnapshot, RemoteStatus, VersionKey};
use histo_common::remote::RemoteStatusClient;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, instrument};
use url::Url;

use crate::payload::StartEncoding;
use crate::validation::{endpoint_url, key_url, validate_base_url};
use crate::wire::{InitialResponse, StartResponse, StatusResponse};

const CONNECT_TIMEOUT_SECS: u64 = 5;
const USER_AGENT_STRING: &str = "histo install engine (Rust)";

/// [`RemoteStatusClient`] over the worker's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base: Url,
}

impl HttpRemote {
    pub fn new(config: &Config) -> Result<Self> {
        let base = validate_base_url(&config.api_base_url)?;
        let client = build_http_client(config.request_timeout)?;
        debug!("Remote worker client targeting {}", base);
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// One start attempt; `Ok(None)` means accepted without echoing a usable key.
    async fn try_start(&self, url: &Url, body: &Value) -> Result<Option<VersionKey>> {
        let response = self.client.post(url.clone()).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let parsed: StartResponse = serde_json::from_str(&text).map_err(|e| {
            debug!("Non-JSON start response (HTTP {}): {}", status, e);
            HistoError::Api(format!("start response was not JSON (HTTP {status})"))
        })?;
        if let Some(err) = parsed.error {
            return Err(HistoError::Api(err));
        }
        if !status.is_success() {
            return Err(HistoError::HttpError(format!(
                "HTTP error {status} for URL {url}"
            )));
        }
        if parsed.started != Some(true) {
            return Err(HistoError::Api(
                "worker did not confirm the start".to_string(),
            ));
        }
        Ok(parsed.confirmed_key())
    }

    async fn get_ok(&self, url: Url) -> Result<String> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoError::HttpError(format!(
                "HTTP error {status} for URL {url}"
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl RemoteStatusClient for HttpRemote {
    #[instrument(skip(self, key), fields(key = %key))]
    async fn start(&self, key: &VersionKey, full_assets: bool) -> Result<VersionKey> {
        let url = endpoint_url(&self.base, &["install"])?;
        let mut last_error: Option<HistoError> = None;
        let mut attempts = 0;

        for encoding in StartEncoding::ALL {
            attempts += 1;
            debug!("[{}] Attempting start with {:?} payload", key, encoding);
            match self.try_start(&url, &encoding.body(key, full_assets)).await {
                Ok(confirmed) => {
                    let confirmed = confirmed.unwrap_or_else(|| key.clone());
                    debug!("[{}] Start accepted as '{}'", key, confirmed);
                    return Ok(confirmed);
                }
                Err(e) => {
                    debug!("[{}] Start payload {:?} rejected: {}", key, encoding, e);
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no start payload encodings".to_string());
        error!("[{}] All start payload encodings failed: {}", key, last_error);
        Err(HistoError::StartRejected {
            key: key.to_string(),
            attempts,
            last_error,
        })
    }

    async fn poll(&self, key: &VersionKey) -> Result<RemoteStatus> {
        let url = key_url(&self.base, "status", key)?;
        let body = self
            .get_ok(url)
            .await
            .map_err(|e| HistoError::TransientPoll(format!("status request failed: {e}")))?;
        let wire: StatusResponse = serde_json::from_str(&body)
            .map_err(|e| HistoError::TransientPoll(format!("malformed status body: {e}")))?;
        Ok(wire.into())
    }

    async fn send_command(&self, key: &VersionKey, command: JobCommand) -> Result<()> {
        let url = key_url(&self.base, command.endpoint(), key)?;
        let response = self.client.post(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoError::HttpError(format!(
                "HTTP error {status} for URL {url}"
            )));
        }
        // Only an explicit `{error: ...}` body counts as a rejection.
        let text = response.text().await.unwrap_or_default();
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
            if let Some(err) = map.get("error").and_then(Value::as_str) {
                return Err(HistoError::Api(format!("{command} rejected: {err}")));
            }
        }
        debug!("[{}] {} command accepted", key, command);
        Ok(())
    }

    async fn snapshot(&self) -> Result<RemoteSnapshot> {
        let url = endpoint_url(&self.base, &["initial"])?;
        let body = self.get_ok(url).await?;
        let wire: InitialResponse = serde_json::from_str(&body)?;
        Ok(wire.into())
    }
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .build()
        .map_err(|e| HistoError::HttpError(format!("Failed to build HTTP client: {e}")))
}
