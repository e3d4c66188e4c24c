use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Game server settings materialized into `server.properties`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Local port the game server listens on and the relay forwards to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Overrides applied on top of the built-in defaults.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    25565
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            properties: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Built-in property defaults for a friends-only server behind a relay.
    pub fn default_properties() -> BTreeMap<String, String> {
        [
            ("online-mode", "false"),
            ("enable-command-block", "true"),
            ("gamemode", "survival"),
            ("difficulty", "easy"),
            ("max-players", "20"),
            ("view-distance", "10"),
            ("motd", "Minecraft server via craftgate"),
            ("white-list", "false"),
            ("spawn-protection", "16"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Defaults, then `server-port`, then configured overrides.
    pub fn effective_properties(&self) -> BTreeMap<String, String> {
        let mut properties = Self::default_properties();
        properties.insert("server-port".to_string(), self.port.to_string());
        properties.extend(
            self.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        properties
    }
}
