pub mod breaker;
pub mod payload;
pub mod rate_limit;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::core::{Network, PoolRecord, Timeframe};
use crate::error::FetchError;

/// Source of pool listings. Every call costs one provider request.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn list_trending_pools(
        &self,
        network: Network,
        duration: Timeframe,
        limit: usize,
    ) -> Result<Vec<PoolRecord>, FetchError>;

    async fn list_new_pools(
        &self,
        network: Network,
        limit: usize,
    ) -> Result<Vec<PoolRecord>, FetchError>;
}

/// GeckoTerminal public API v2 client.
pub struct GeckoTerminalClient {
    base_url: String,
    client: Client,
    api_key: Option<String>,
}

impl GeckoTerminalClient {
    const ACCEPT: &'static str = "application/json;version=20230302";

    pub fn new(config: &ProviderConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    async fn get_pools(
        &self,
        network: Network,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<PoolRecord>, FetchError> {
        let url = format!("{}/networks/{}/{}", self.base_url, network.as_str(), path);
        let mut request = self
            .client
            .get(&url)
            .query(query)
            .header("Accept", Self::ACCEPT);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited(url));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.text().await?;
        let records = payload::parse_pool_list(&body, network)?;
        debug!(network = %network, path, pools = records.len(), "fetched pools");
        Ok(records)
    }
}

#[async_trait]
impl MarketData for GeckoTerminalClient {
    async fn list_trending_pools(
        &self,
        network: Network,
        duration: Timeframe,
        limit: usize,
    ) -> Result<Vec<PoolRecord>, FetchError> {
        self.get_pools(
            network,
            "trending_pools",
            &[
                ("duration", duration.label().to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn list_new_pools(
        &self,
        network: Network,
        limit: usize,
    ) -> Result<Vec<PoolRecord>, FetchError> {
        self.get_pools(network, "new_pools", &[("limit", limit.to_string())])
            .await
    }
}
