//! Upstream metadata API configuration.

use serde::{Deserialize, Serialize};

/// Where variant metadata and builds come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Mojang version manifest (vanilla).
    #[serde(default = "default_mojang_manifest_url")]
    pub mojang_manifest_url: String,

    /// PaperMC API base URL.
    #[serde(default = "default_paper_api_url")]
    pub paper_api_url: String,

    /// Purpur API base URL.
    #[serde(default = "default_purpur_api_url")]
    pub purpur_api_url: String,

    /// Fabric meta API base URL.
    #[serde(default = "default_fabric_meta_url")]
    pub fabric_meta_url: String,

    /// Installer page for Forge; `{version}` is substituted.
    #[serde(default = "default_forge_installer_page")]
    pub forge_installer_page: String,

    /// Installer page for hybrid (mods + plugins) servers.
    #[serde(default = "default_hybrid_installer_page")]
    pub hybrid_installer_page: String,

    /// Timeout for metadata requests (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connect timeout for all requests, downloads included (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Versions offered by `craftgate versions`.
    #[serde(default = "default_suggested_versions")]
    pub suggested_versions: Vec<String>,
}

fn default_mojang_manifest_url() -> String {
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json".to_string()
}

fn default_paper_api_url() -> String {
    "https://api.papermc.io".to_string()
}

fn default_purpur_api_url() -> String {
    "https://api.purpurmc.org".to_string()
}

fn default_fabric_meta_url() -> String {
    "https://meta.fabricmc.net".to_string()
}

fn default_forge_installer_page() -> String {
    "https://files.minecraftforge.net/net/minecraftforge/forge/index_{version}.html".to_string()
}

fn default_hybrid_installer_page() -> String {
    "https://mohistmc.com/software/mohist".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("craftgate/{}", env!("CARGO_PKG_VERSION"))
}

fn default_suggested_versions() -> Vec<String> {
    [
        "1.21.4", "1.21.3", "1.21.1", "1.21", "1.20.6", "1.20.4", "1.20.2", "1.20.1", "1.19.4",
        "1.19.2", "1.18.2", "1.17.1", "1.16.5", "1.12.2", "1.8.9",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            mojang_manifest_url: default_mojang_manifest_url(),
            paper_api_url: default_paper_api_url(),
            purpur_api_url: default_purpur_api_url(),
            fabric_meta_url: default_fabric_meta_url(),
            forge_installer_page: default_forge_installer_page(),
            hybrid_installer_page: default_hybrid_installer_page(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
            suggested_versions: default_suggested_versions(),
        }
    }
}

impl UpstreamConfig {
    /// Every API pointed at one base URL. Used to aim tests at a mock server.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            mojang_manifest_url: format!("{}/mc/game/version_manifest_v2.json", base),
            paper_api_url: base.to_string(),
            purpur_api_url: base.to_string(),
            fabric_meta_url: base.to_string(),
            ..Self::default()
        }
    }
}
