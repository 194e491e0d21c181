use crate::app::config::NetworkConfig;
use crate::core::models::{BidsResponse, ConfigSnapshot};
use crate::core::network::{BidRequest, ConfigRequest, FetchError};
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode, redirect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Transport to the auction service. Each call completes before the
/// unit of work that issued it moves on.
#[async_trait]
pub trait WireClient: Send + Sync {
    async fn load_bids(
        &self,
        request: &BidRequest,
        user_agent: &str,
    ) -> Result<BidsResponse, FetchError>;

    async fn load_config(&self, request: &ConfigRequest) -> Result<ConfigSnapshot, FetchError>;
}

/// JSON over http wire client
pub struct HttpWireClient {
    client: Client,
    bid_url: String,
    config_url: String,
}

impl HttpWireClient {
    /// Builds the underlying http client eagerly so a bad setup fails
    /// at startup rather than on the first call
    pub fn new(config: &NetworkConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .redirect(redirect::Policy::none())
            .tcp_nodelay(true)
            .gzip(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            bid_url: config.bid_url.clone(),
            config_url: config.config_url.clone(),
        })
    }

    /// POSTs `body` as json and decodes the answer. `None` when the
    /// server answered 204.
    async fn post<B, R>(
        &self,
        url: &str,
        body: &B,
        user_agent: Option<&str>,
    ) -> Result<Option<R>, FetchError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;

        let mut req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body);

        if let Some(user_agent) = user_agent {
            let value = HeaderValue::from_str(user_agent)
                .map_err(|e| FetchError::Transport(anyhow!("Invalid user agent: {}", e)))?;
            req = req.header(USER_AGENT, value);
        }

        let res = req
            .send()
            .await
            .map_err(|e| FetchError::Transport(anyhow!("Failed to call {}: {}", url, e)))?;

        let status = res.status();
        if status == StatusCode::NO_CONTENT {
            debug!("Http 204 from {}", url);
            return Ok(None);
        }

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = res.bytes().await.map_err(|e| {
            FetchError::Transport(anyhow!("Failed to read response of {}: {}", url, e))
        })?;

        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl WireClient for HttpWireClient {
    async fn load_bids(
        &self,
        request: &BidRequest,
        user_agent: &str,
    ) -> Result<BidsResponse, FetchError> {
        if tracing::event_enabled!(tracing::Level::TRACE) {
            tracing::trace!("{}", serde_json::to_string(request)?);
        }

        Ok(self
            .post(&self.bid_url, request, Some(user_agent))
            .await?
            .unwrap_or_default())
    }

    async fn load_config(&self, request: &ConfigRequest) -> Result<ConfigSnapshot, FetchError> {
        Ok(self
            .post(&self.config_url, request, None)
            .await?
            .unwrap_or_default())
    }
}
