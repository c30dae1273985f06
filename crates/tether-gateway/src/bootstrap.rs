//! REST lookups that find the websocket URL before connecting.

use serde::{Deserialize, Serialize};
use tether_proto::Milliseconds;
use tracing::debug;
use url::Url;

use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
struct GatewayData {
    url: String,
}

/// Response of the authenticated `gateway/bot` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBotData {
    /// Websocket URL.
    pub url: String,
    /// Recommended number of shards.
    #[serde(default)]
    pub shards: u32,
    /// How many more sessions may be started right now.
    #[serde(rename = "session_start_limit", default)]
    pub start_limit: Option<SessionStartLimit>,
}

/// Identify budget for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    /// Session starts allowed per window.
    pub total: u32,
    /// Session starts left in this window.
    pub remaining: u32,
    /// Time until the window resets.
    pub reset_after: Milliseconds,
}

/// HTTP client for the bootstrap endpoints.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    client: reqwest::Client,
    api_base: Url,
}

impl Bootstrap {
    /// Create a client rooted at `api_base`, e.g. `https://discord.com/api/v6/`.
    pub fn new(api_base: &str) -> Result<Self, GatewayError> {
        let mut api_base = Url::parse(api_base)
            .map_err(|e| GatewayError::Config(format!("invalid api_base '{api_base}': {e}")))?;
        // Url::join drops the last path segment unless the base ends in a slash.
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
        })
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.api_base
            .join(path)
            .map_err(|e| GatewayError::Config(format!("invalid endpoint '{path}': {e}")))
    }

    /// Look up the websocket URL without authenticating.
    pub async fn gateway_url(&self) -> Result<String, GatewayError> {
        let endpoint = self.endpoint("gateway")?;
        debug!(%endpoint, "fetching gateway URL");

        let data: GatewayData = self
            .client
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(data.url)
    }

    /// Look up the websocket URL with shard and session-start information.
    pub async fn gateway_bot(&self, token: &str) -> Result<GatewayBotData, GatewayError> {
        let endpoint = self.endpoint("gateway/bot")?;
        debug!(%endpoint, "fetching bot gateway info");

        let data = self
            .client
            .get(endpoint)
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(data)
    }
}

/// Append the protocol version and encoding to a gateway URL.
pub fn with_query(url: &str, version: u8, encoding: &str) -> Result<String, GatewayError> {
    let mut url = Url::parse(url)
        .map_err(|e| GatewayError::Config(format!("invalid gateway URL '{url}': {e}")))?;
    url.query_pairs_mut()
        .append_pair("v", &version.to_string())
        .append_pair("encoding", encoding);
    Ok(url.into())
}
