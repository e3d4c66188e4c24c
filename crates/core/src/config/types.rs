use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::artifact::UpstreamConfig;
use crate::process::{JvmConfig, ShutdownConfig};
use crate::provision::ProvisionConfig;
use crate::server_files::ServerConfig;
use crate::tunnel::RelayConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub jvm: JvmConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub provision: ProvisionConfig,
}

/// Filesystem locations, relative paths are resolved against `root`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_server_dir")]
    pub server_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_relay_log")]
    pub relay_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            server_dir: default_server_dir(),
            state_file: default_state_file(),
            relay_log: default_relay_log(),
        }
    }
}

impl PathsConfig {
    /// Directory the game server runs in.
    pub fn server_dir(&self) -> PathBuf {
        self.resolve(&self.server_dir)
    }

    /// Persisted profile document.
    pub fn state_file(&self) -> PathBuf {
        self.resolve(&self.state_file)
    }

    /// Log sink for the relay client's output.
    pub fn relay_log(&self) -> PathBuf {
        self.resolve(&self.relay_log)
    }

    /// Executables with a directory part resolve against the root; bare
    /// names are left for a PATH lookup.
    pub fn resolve_program(&self, program: &std::path::Path) -> PathBuf {
        if program.components().count() > 1 {
            self.resolve(program)
        } else {
            program.to_path_buf()
        }
    }

    /// Resolves a path against the configured root unless it is absolute.
    pub fn resolve(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_server_dir() -> PathBuf {
    PathBuf::from("minecraft_server")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("server_config.json")
}

fn default_relay_log() -> PathBuf {
    PathBuf::from("relay.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::Region;

    #[test]
    fn test_resolve_program() {
        let paths = PathsConfig {
            root: PathBuf::from("/srv/craft"),
            ..Default::default()
        };
        assert_eq!(
            paths.resolve_program(std::path::Path::new("./ngrok")),
            PathBuf::from("/srv/craft/./ngrok")
        );
        assert_eq!(
            paths.resolve_program(std::path::Path::new("ngrok")),
            PathBuf::from("ngrok")
        );
        assert_eq!(
            paths.resolve_program(std::path::Path::new("/usr/local/bin/ngrok")),
            PathBuf::from("/usr/local/bin/ngrok")
        );
    }

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.paths.server_dir, PathBuf::from("minecraft_server"));
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.jvm.min_heap, "1G");
        assert_eq!(config.jvm.max_heap, "2G");
        assert_eq!(config.relay.max_attempts, 10);
        assert_eq!(config.relay.poll_interval_ms, 1000);
        assert_eq!(config.relay.region, Region::Us);
    }

    #[test]
    fn test_deserialize_partial_sections() {
        let toml = r#"
[paths]
root = "/srv/mc"

[server]
port = 25570

[server.properties]
motd = "Friends only"

[relay]
region = "eu"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.paths.root, PathBuf::from("/srv/mc"));
        assert_eq!(
            config.paths.server_dir(),
            PathBuf::from("/srv/mc/minecraft_server")
        );
        assert_eq!(config.server.port, 25570);
        assert_eq!(
            config.server.properties.get("motd").map(String::as_str),
            Some("Friends only")
        );
        assert_eq!(config.relay.region, Region::Eu);
    }

    #[test]
    fn test_absolute_paths_are_not_rebased() {
        let paths = PathsConfig {
            root: PathBuf::from("/srv/mc"),
            state_file: PathBuf::from("/var/lib/craftgate/state.json"),
            ..Default::default()
        };
        assert_eq!(
            paths.state_file(),
            PathBuf::from("/var/lib/craftgate/state.json")
        );
        assert_eq!(paths.relay_log(), PathBuf::from("/srv/mc/relay.log"));
    }
}
