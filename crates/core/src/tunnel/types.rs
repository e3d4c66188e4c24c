use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TunnelError;

/// Relay region, picked for latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Us,
    Eu,
    Ap,
    Au,
    Sa,
    Jp,
    In,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Us,
        Region::Eu,
        Region::Ap,
        Region::Au,
        Region::Sa,
        Region::Jp,
        Region::In,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "us",
            Region::Eu => "eu",
            Region::Ap => "ap",
            Region::Au => "au",
            Region::Sa => "sa",
            Region::Jp => "jp",
            Region::In => "in",
        }
    }

    pub fn location(&self) -> &'static str {
        match self {
            Region::Us => "United States (Ohio)",
            Region::Eu => "Europe (Frankfurt)",
            Region::Ap => "Asia/Pacific (Singapore)",
            Region::Au => "Australia (Sydney)",
            Region::Sa => "South America (São Paulo)",
            Region::Jp => "Japan (Tokyo)",
            Region::In => "India (Mumbai)",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| TunnelError::UnknownRegion(s.to_string()))
    }
}

/// Public address through which players reach the local server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelEndpoint {
    pub host: String,
    pub port: u16,
    pub region: Region,
    pub obtained_at: DateTime<Utc>,
}

impl TunnelEndpoint {
    pub fn new(host: impl Into<String>, port: u16, region: Region) -> Self {
        Self {
            host: host.into(),
            port,
            region,
            obtained_at: Utc::now(),
        }
    }

    /// Parses `tcp://host:port`, `host:port`, or any `scheme://host:port/...`.
    pub fn from_public_url(url: &str, region: Region) -> Result<Self, TunnelError> {
        let invalid = || TunnelError::InvalidAddress(url.to_string());

        let without_scheme = match url.trim().split_once("://") {
            Some((_, rest)) => rest,
            None => url.trim(),
        };
        let authority = without_scheme.split('/').next().unwrap_or_default();
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Self::new(host, port, region))
    }
}

impl fmt::Display for TunnelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One tunnel entry from the relay's status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTunnel {
    #[serde(default)]
    pub name: Option<String>,
    pub public_url: String,
    #[serde(default)]
    pub proto: Option<String>,
}

impl RelayTunnel {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            name: None,
            public_url: public_url.into(),
            proto: None,
        }
    }
}

/// Supervisor state machine.
///
/// `Idle -> Launching -> AwaitingEndpoint -> EndpointAssigned | TimedOut -> Stopped`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Launching,
    AwaitingEndpoint {
        attempts: u32,
    },
    EndpointAssigned {
        endpoint: TunnelEndpoint,
        attempts: u32,
    },
    TimedOut {
        attempts: u32,
    },
    /// Terminal. Any endpoint published earlier is stale.
    Stopped {
        stale_endpoint: Option<TunnelEndpoint>,
    },
}

impl TunnelState {
    pub fn name(&self) -> &'static str {
        match self {
            TunnelState::Idle => "idle",
            TunnelState::Launching => "launching",
            TunnelState::AwaitingEndpoint { .. } => "awaiting_endpoint",
            TunnelState::EndpointAssigned { .. } => "endpoint_assigned",
            TunnelState::TimedOut { .. } => "timed_out",
            TunnelState::Stopped { .. } => "stopped",
        }
    }

    /// The endpoint, only while it is valid.
    pub fn endpoint(&self) -> Option<&TunnelEndpoint> {
        match self {
            TunnelState::EndpointAssigned { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Polling has finished one way or another.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TunnelState::EndpointAssigned { .. }
                | TunnelState::TimedOut { .. }
                | TunnelState::Stopped { .. }
        )
    }
}

/// Result of a bounded polling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Assigned {
        endpoint: TunnelEndpoint,
        attempts: u32,
    },
    TimedOut {
        attempts: u32,
    },
}
