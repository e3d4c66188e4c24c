use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ProfileError;
use crate::tunnel::TunnelEndpoint;

/// Flavor of game-server build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Official server.
    Vanilla,
    /// Optimized fork with Bukkit/Spigot plugin support.
    Paper,
    /// Paper fork with extra gameplay options.
    Purpur,
    /// Lightweight server-side mod loader.
    Fabric,
    /// Traditional mod loader, installer based.
    Forge,
    /// Mods and plugins together (Mohist-style), installer based.
    Hybrid,
}

impl Variant {
    pub const ALL: [Variant; 6] = [
        Variant::Vanilla,
        Variant::Paper,
        Variant::Purpur,
        Variant::Fabric,
        Variant::Forge,
        Variant::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Vanilla => "vanilla",
            Variant::Paper => "paper",
            Variant::Purpur => "purpur",
            Variant::Fabric => "fabric",
            Variant::Forge => "forge",
            Variant::Hybrid => "hybrid",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Variant::Vanilla => "Official Minecraft server",
            Variant::Paper => "Paper (optimized, Bukkit/Spigot plugins)",
            Variant::Purpur => "Purpur (Paper with extra options)",
            Variant::Fabric => "Fabric (server-side mods)",
            Variant::Forge => "Forge (traditional mods)",
            Variant::Hybrid => "Hybrid (mods + plugins)",
        }
    }

    /// File name of the launchable jar inside the server directory.
    pub fn jar_file_name(&self) -> &'static str {
        match self {
            Variant::Vanilla => "server.jar",
            Variant::Paper => "paper.jar",
            Variant::Purpur => "purpur.jar",
            Variant::Fabric => "fabric-server-launch.jar",
            Variant::Forge => "forge-server.jar",
            Variant::Hybrid => "hybrid-server.jar",
        }
    }

    /// Whether obtaining this variant needs an installer run by hand.
    pub fn requires_manual_install(&self) -> bool {
        matches!(self, Variant::Forge | Variant::Hybrid)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vanilla" => Ok(Variant::Vanilla),
            "paper" => Ok(Variant::Paper),
            "purpur" => Ok(Variant::Purpur),
            "fabric" => Ok(Variant::Fabric),
            "forge" => Ok(Variant::Forge),
            "hybrid" | "mohist" => Ok(Variant::Hybrid),
            other => Err(ProfileError::UnknownVariant(other.to_string())),
        }
    }
}

/// The variant/version pair a server directory was created with.
///
/// Never mutated after creation; re-creating a server replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProfile {
    variant: Variant,
    game_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pinned_build: Option<u32>,
    created_at: DateTime<Utc>,
}

impl ServerProfile {
    pub fn new(variant: Variant, game_version: impl Into<String>) -> Self {
        Self {
            variant,
            game_version: game_version.into(),
            pinned_build: None,
            created_at: Utc::now(),
        }
    }

    /// Same profile, pinned to a specific upstream build.
    pub fn with_pinned_build(self, build: Option<u32>) -> Self {
        Self {
            pinned_build: build,
            ..self
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn game_version(&self) -> &str {
        &self.game_version
    }

    pub fn pinned_build(&self) -> Option<u32> {
        self.pinned_build
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Where a stored endpoint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointSource {
    /// Read from the relay's status API.
    Relay,
    /// Typed in by the operator.
    Manual,
}

/// Last known public endpoint and whether it can still be trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEndpoint {
    #[serde(flatten)]
    pub endpoint: TunnelEndpoint,
    pub source: EndpointSource,
    /// False once the relay that produced it has stopped.
    pub valid: bool,
}

/// The full persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredState {
    #[serde(flatten)]
    pub profile: ServerProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<StoredEndpoint>,
}

impl StoredState {
    /// Endpoint to show to players, if one is still valid.
    pub fn live_endpoint(&self) -> Option<&TunnelEndpoint> {
        self.tunnel
            .as_ref()
            .filter(|t| t.valid)
            .map(|t| &t.endpoint)
    }
}
