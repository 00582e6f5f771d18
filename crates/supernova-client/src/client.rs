//! Control endpoint client.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use supernova_core::{
    DeviceConfigRequest, DeviceConfigResponse, Result, SupernovaError, DEVICE_CONFIG_PATH,
    DEVICE_NAME_HEADER,
};
use tracing::debug;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("supernovad/", env!("CARGO_PKG_VERSION"));

/// Source of the node's desired tunnel configuration.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Fetch the current config blob once. No retries at this layer.
    async fn fetch(&self) -> Result<String>;
}

/// Client for the device config endpoint of the control plane
#[derive(Clone)]
pub struct ConfigClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    config_url: String,
    device_name: String,
    device_token: String,
    config_override: String,
}

impl ConfigClient {
    /// Create a builder for the given endpoint and device credentials
    #[must_use]
    pub fn builder(
        endpoint: impl Into<String>,
        device_name: impl Into<String>,
        device_token: impl Into<String>,
    ) -> ConfigClientBuilder {
        ConfigClientBuilder::new(endpoint, device_name, device_token)
    }

    /// POST the override to the config endpoint and return the config blob.
    ///
    /// Anything but `200 OK` is an error; the status class is not inspected.
    pub async fn fetch_config(&self) -> Result<String> {
        let body = DeviceConfigRequest {
            config_override: self.inner.config_override.clone(),
        };
        debug!(url = %self.inner.config_url, device = %self.inner.device_name, "POST request");

        let response = self
            .inner
            .http
            .post(&self.inner.config_url)
            .bearer_auth(&self.inner.device_token)
            .header(DEVICE_NAME_HEADER, &self.inner.device_name)
            .json(&body)
            .send()
            .await
            .map_err(|e| SupernovaError::Http(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SupernovaError::Http(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(Self::api_error(status, body));
        }

        let parsed: DeviceConfigResponse = serde_json::from_str(&body)?;
        Ok(parsed.config)
    }

    /// Convert an error response, preferring the JSON `error` field
    fn api_error(status: StatusCode, body: String) -> SupernovaError {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);

        SupernovaError::Api {
            code: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ConfigFetcher for ConfigClient {
    async fn fetch(&self) -> Result<String> {
        self.fetch_config().await
    }
}

/// Builder for configuring a [`ConfigClient`]
pub struct ConfigClientBuilder {
    endpoint: String,
    device_name: String,
    device_token: String,
    config_override: String,
    timeout: Duration,
}

impl ConfigClientBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        device_name: impl Into<String>,
        device_token: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            device_name: device_name.into(),
            device_token: device_token.into(),
            config_override: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Config override sent with every fetch
    #[must_use]
    pub fn config_override(mut self, config_override: impl Into<String>) -> Self {
        self.config_override = config_override.into();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client, validating the endpoint URL
    pub fn build(self) -> Result<ConfigClient> {
        let base = url::Url::parse(&self.endpoint)
            .map_err(|e| SupernovaError::Config(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        let config_url = format!(
            "{}{}",
            base.as_str().trim_end_matches('/'),
            DEVICE_CONFIG_PATH
        );

        let http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| SupernovaError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(ConfigClient {
            inner: Arc::new(ClientInner {
                http,
                config_url,
                device_name: self.device_name,
                device_token: self.device_token,
                config_override: self.config_override,
            }),
        })
    }
}
