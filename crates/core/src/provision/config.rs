//! Provisioning configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Command that installs the Java runtime. Empty disables installing.
    #[serde(default = "default_runtime_install")]
    pub runtime_install: Vec<String>,

    /// Lowest acceptable Java major version.
    #[serde(default = "default_min_java_major")]
    pub min_java_major: u32,

    /// Direct download for a single-file relay binary. Takes precedence
    /// over `relay_install`.
    #[serde(default)]
    pub relay_download_url: Option<String>,

    /// Command that installs the relay client into the root directory.
    #[serde(default = "default_relay_install")]
    pub relay_install: Vec<String>,

    /// Optional convenience tools.
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,

    /// Command prefix for installing tools; the tool name is appended.
    #[serde(default = "default_tool_install")]
    pub tool_install: Vec<String>,
}

fn default_runtime_install() -> Vec<String> {
    ["sudo", "apt-get", "install", "-y", "openjdk-17-jre-headless"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_java_major() -> u32 {
    17
}

fn default_relay_install() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        "curl -fsSL https://bin.equinox.io/c/bNyj1mQVY4c/ngrok-v3-stable-linux-amd64.tgz | tar -xz"
            .to_string(),
    ]
}

fn default_tools() -> Vec<String> {
    ["curl", "wget", "unzip"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_tool_install() -> Vec<String> {
    ["sudo", "apt-get", "install", "-y"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            runtime_install: default_runtime_install(),
            min_java_major: default_min_java_major(),
            relay_download_url: None,
            relay_install: default_relay_install(),
            tools: default_tools(),
            tool_install: default_tool_install(),
        }
    }
}
