//! Mock relay status API for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::tunnel::{RelayStatusSource, RelayTunnel, TunnelError};

#[derive(Debug, Clone)]
enum ScriptedResponse {
    Tunnels(Vec<RelayTunnel>),
    Unavailable,
}

/// Mock implementation of [`RelayStatusSource`].
///
/// Responses are consumed in order, one per poll. Once the script runs out,
/// every poll returns the fallback (an empty tunnel list unless changed).
///
/// # Example
///
/// ```rust,ignore
/// let source = MockRelayStatus::new();
/// source.push_empty().await;
/// source.push_empty().await;
/// source.push_tunnels(vec![RelayTunnel::new("tcp://0.tcp.ngrok.io:54321")]).await;
///
/// // third poll sees the tunnel
/// assert_eq!(source.poll_count().await, 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockRelayStatus {
    script: Arc<RwLock<VecDeque<ScriptedResponse>>>,
    fallback: Arc<RwLock<Vec<RelayTunnel>>>,
    polls: Arc<RwLock<u32>>,
}

impl MockRelayStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a poll that sees no tunnels yet.
    pub async fn push_empty(&self) {
        self.script
            .write()
            .await
            .push_back(ScriptedResponse::Tunnels(Vec::new()));
    }

    /// Queue a poll where the status API is not reachable.
    pub async fn push_unavailable(&self) {
        self.script
            .write()
            .await
            .push_back(ScriptedResponse::Unavailable);
    }

    /// Queue a poll returning these tunnels.
    pub async fn push_tunnels(&self, tunnels: Vec<RelayTunnel>) {
        self.script
            .write()
            .await
            .push_back(ScriptedResponse::Tunnels(tunnels));
    }

    /// Tunnels returned once the script is exhausted.
    pub async fn set_fallback(&self, tunnels: Vec<RelayTunnel>) {
        *self.fallback.write().await = tunnels;
    }

    pub async fn poll_count(&self) -> u32 {
        *self.polls.read().await
    }
}

#[async_trait]
impl RelayStatusSource for MockRelayStatus {
    async fn fetch_tunnels(&self) -> Result<Vec<RelayTunnel>, TunnelError> {
        *self.polls.write().await += 1;

        let next = self.script.write().await.pop_front();
        match next {
            Some(ScriptedResponse::Tunnels(tunnels)) => Ok(tunnels),
            Some(ScriptedResponse::Unavailable) => Err(TunnelError::Status(
                "connection refused (mock)".to_string(),
            )),
            None => Ok(self.fallback.read().await.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockRelayStatus::new();
        mock.push_unavailable().await;
        mock.set_fallback(vec![RelayTunnel::new("tcp://a:1")]).await;

        assert!(mock.fetch_tunnels().await.is_err());
        assert_eq!(mock.fetch_tunnels().await.unwrap().len(), 1);
        assert_eq!(mock.fetch_tunnels().await.unwrap().len(), 1);
        assert_eq!(mock.poll_count().await, 3);
    }
}
