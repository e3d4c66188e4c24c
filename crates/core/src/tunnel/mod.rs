//! Relay tunnel supervision.
//!
//! The relay client is an opaque executable that opens an outbound
//! connection to a public relay and reports the assigned public address on a
//! local status API. [`TunnelSupervisor`] launches it with its output sent to
//! a log file, polls the status API on a bounded budget, and publishes the
//! resulting [`TunnelEndpoint`] exactly once through a watch channel.
//!
//! Tunnel failures never stop the game server: a timeout or a relay crash
//! degrades to "no public endpoint".

mod config;
mod status;
mod supervisor;
mod types;

pub use config::RelayConfig;
pub use status::{HttpRelayStatus, RelayStatusSource};
pub use supervisor::{poll_for_endpoint, StopMode, TunnelHandle, TunnelSupervisor};
pub use types::{PollOutcome, Region, RelayTunnel, TunnelEndpoint, TunnelState};

use thiserror::Error;

/// Errors from the tunnel supervisor. None of them are fatal to a session.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The relay client could not be started.
    #[error("failed to launch relay client: {0}")]
    Launch(#[from] crate::process::ProcessError),

    /// The status API answered with something unusable.
    #[error("relay status API error: {0}")]
    Status(String),

    /// HTTP request to the status API failed.
    #[error("relay status request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No endpoint was assigned within the polling budget.
    #[error("no public endpoint after {attempts} attempts; check the relay dashboard manually")]
    Timeout { attempts: u32 },

    /// A public address could not be read as host:port.
    #[error("invalid public address: {0}")]
    InvalidAddress(String),

    /// The relay stopped before or after assigning an endpoint.
    #[error("relay client is not running")]
    NotRunning,

    /// Unknown region code.
    #[error("unknown relay region: {0}")]
    UnknownRegion(String),
}

impl TunnelError {
    /// Whether polling again later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Status(_) | Self::Http(_) | Self::Timeout { .. } | Self::NotRunning
        )
    }
}
