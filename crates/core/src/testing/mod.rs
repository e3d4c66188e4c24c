//! Testing utilities and mock implementations.
//!
//! Mocks for the traits at the edges of the crate plus fixtures for the
//! upstream JSON documents, so workflows can be exercised against
//! `httpmock` servers and `sh` stub executables.
//!
//! # Example
//!
//! ```rust,ignore
//! use craftgate_core::testing::{fixtures, MockRelayStatus};
//!
//! let relay = MockRelayStatus::new();
//! relay.push_empty().await;
//! relay.push_tunnels(vec![RelayTunnel::new("tcp://0.tcp.ngrok.io:54321")]).await;
//!
//! let java = fixtures::write_script(dir.path(), "java", "exit 0");
//! ```

mod mock_relay_status;

pub use mock_relay_status::MockRelayStatus;

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};

    /// Mojang version manifest listing `ids`, each pointing at
    /// `{base_url}/v1/packages/{id}.json`.
    pub fn vanilla_manifest(base_url: &str, ids: &[&str]) -> Value {
        let versions: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "type": "release",
                    "url": format!("{}/v1/packages/{}.json", base_url, id),
                    "time": "2023-12-07T12:56:20+00:00",
                    "releaseTime": "2023-12-07T12:56:20+00:00"
                })
            })
            .collect();
        json!({
            "latest": {"release": ids.first().copied().unwrap_or_default(), "snapshot": ""},
            "versions": versions
        })
    }

    /// Version detail whose server download lives at
    /// `{base_url}/v1/objects/{version}/server.jar`.
    pub fn vanilla_detail(base_url: &str, version: &str, size: u64) -> Value {
        json!({
            "id": version,
            "downloads": {
                "client": {
                    "sha1": "0000000000000000000000000000000000000000",
                    "size": 1,
                    "url": format!("{}/v1/objects/{}/client.jar", base_url, version)
                },
                "server": {
                    "sha1": "0000000000000000000000000000000000000000",
                    "size": size,
                    "url": format!("{}/v1/objects/{}/server.jar", base_url, version)
                }
            }
        })
    }

    /// Paper build listing for `version`.
    pub fn paper_builds(version: &str, builds: &[u32]) -> Value {
        let builds: Vec<Value> = builds
            .iter()
            .map(|build| {
                json!({
                    "build": build,
                    "time": "2024-04-25T10:00:00.000Z",
                    "channel": "default",
                    "promoted": false,
                    "downloads": {
                        "application": {
                            "name": format!("paper-{}-{}.jar", version, build),
                            "sha256": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                        }
                    }
                })
            })
            .collect();
        json!({"project_id": "paper", "version": version, "builds": builds})
    }

    /// Relay status document with one entry per public URL.
    pub fn relay_tunnels(public_urls: &[&str]) -> Value {
        let tunnels: Vec<Value> = public_urls
            .iter()
            .map(|url| json!({"name": "minecraft", "public_url": url, "proto": "tcp"}))
            .collect();
        json!({"tunnels": tunnels})
    }

    /// Writes an executable `sh` script and returns its path.
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)) {
            panic!("failed to write script {:?}: {}", path, e);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            {
                panic!("failed to chmod script {:?}: {}", path, e);
            }
        }
        path
    }
}
