//! JVM and shutdown configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How to start the Java runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JvmConfig {
    /// Java executable.
    #[serde(default = "default_java_path")]
    pub java_path: PathBuf,

    /// Initial heap (`-Xms`).
    #[serde(default = "default_min_heap")]
    pub min_heap: String,

    /// Maximum heap (`-Xmx`).
    #[serde(default = "default_max_heap")]
    pub max_heap: String,

    /// Extra JVM flags placed before `-jar`.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_java_path() -> PathBuf {
    PathBuf::from("java")
}

fn default_min_heap() -> String {
    "1G".to_string()
}

fn default_max_heap() -> String {
    "2G".to_string()
}

impl Default for JvmConfig {
    fn default() -> Self {
        Self {
            java_path: default_java_path(),
            min_heap: default_min_heap(),
            max_heap: default_max_heap(),
            extra_args: Vec::new(),
        }
    }
}

/// Graceful shutdown behavior for the game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds to wait after the stop command before killing.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Console command that saves and stops the server.
    #[serde(default = "default_stop_command")]
    pub stop_command: String,
}

fn default_grace_period() -> u64 {
    30
}

fn default_stop_command() -> String {
    "stop".to_string()
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            stop_command: default_stop_command(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let jvm = JvmConfig::default();
        assert_eq!(jvm.min_heap, "1G");
        assert_eq!(jvm.max_heap, "2G");
        assert!(jvm.extra_args.is_empty());

        let shutdown = ShutdownConfig::default();
        assert_eq!(shutdown.grace_period_secs, 30);
        assert_eq!(shutdown.stop_command, "stop");
    }

    #[test]
    fn test_partial_deserialize() {
        let jvm: JvmConfig = toml::from_str(r#"max_heap = "4G""#).unwrap();
        assert_eq!(jvm.max_heap, "4G");
        assert_eq!(jvm.min_heap, "1G");
        assert_eq!(jvm.java_path, PathBuf::from("java"));
    }
}
