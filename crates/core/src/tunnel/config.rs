//! Relay client configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::types::Region;

/// How to launch and watch the relay client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Whether to open a tunnel at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Relay executable. Paths with a directory part are resolved against the root.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Arguments; `{port}` and `{region}` are substituted.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Local status API listing active tunnels.
    #[serde(default = "default_status_url")]
    pub status_url: String,

    /// Delay between status polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Polls before giving up on an endpoint.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-request timeout for the status API (milliseconds).
    #[serde(default = "default_status_timeout")]
    pub status_timeout_ms: u64,

    /// Region to ask the relay for.
    #[serde(default)]
    pub region: Region,

    /// Time the relay gets to exit after SIGTERM before it is killed (milliseconds).
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_program() -> PathBuf {
    PathBuf::from("./ngrok")
}

fn default_args() -> Vec<String> {
    ["tcp", "{port}", "--region", "{region}", "--log", "stdout"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_status_url() -> String {
    "http://127.0.0.1:4040/api/tunnels".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_status_timeout() -> u64 {
    2000
}

fn default_stop_grace() -> u64 {
    3000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            program: default_program(),
            args: default_args(),
            status_url: default_status_url(),
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            status_timeout_ms: default_status_timeout(),
            region: Region::default(),
            stop_grace_ms: default_stop_grace(),
        }
    }
}

impl RelayConfig {
    /// Arguments with placeholders filled in.
    pub fn render_args(&self, local_port: u16) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{port}", &local_port.to_string())
                    .replace("{region}", self.region.as_str())
            })
            .collect()
    }
}
