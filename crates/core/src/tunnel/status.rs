use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::types::RelayTunnel;
use super::TunnelError;

/// Source of the relay's active tunnel list.
#[async_trait]
pub trait RelayStatusSource: Send + Sync {
    /// Returns the currently active tunnels, possibly none.
    async fn fetch_tunnels(&self) -> Result<Vec<RelayTunnel>, TunnelError>;
}

/// Reads tunnels from the relay's local HTTP status API.
pub struct HttpRelayStatus {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TunnelsResponse {
    #[serde(default)]
    tunnels: Vec<RelayTunnel>,
}

impl HttpRelayStatus {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TunnelError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RelayStatusSource for HttpRelayStatus {
    async fn fetch_tunnels(&self) -> Result<Vec<RelayTunnel>, TunnelError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TunnelError::Status(format!(
                "{} returned {}",
                self.url,
                status.as_u16()
            )));
        }

        let body: TunnelsResponse = response
            .json()
            .await
            .map_err(|e| TunnelError::Status(format!("malformed tunnel list: {}", e)))?;

        debug!("Relay reports {} tunnel(s)", body.tunnels.len());
        Ok(body.tunnels)
    }
}
