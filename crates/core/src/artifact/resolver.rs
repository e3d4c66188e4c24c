//! Variant dispatch: metadata API lookups that produce a download descriptor.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::fetcher::ArtifactFetcher;
use super::types::{Checksum, DownloadDescriptor};
use super::ArtifactError;
use crate::profile::Variant;

#[derive(Debug, Deserialize)]
struct VersionManifest {
    versions: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct VersionDetail {
    #[serde(default)]
    downloads: HashMap<String, DetailDownload>,
}

#[derive(Debug, Deserialize)]
struct DetailDownload {
    url: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PaperBuilds {
    builds: Vec<PaperBuild>,
}

#[derive(Debug, Deserialize)]
struct PaperBuild {
    build: u32,
    downloads: HashMap<String, PaperDownload>,
}

#[derive(Debug, Deserialize)]
struct PaperDownload {
    name: String,
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PurpurVersion {
    builds: PurpurBuilds,
}

#[derive(Debug, Deserialize)]
struct PurpurBuilds {
    latest: String,
    #[serde(default)]
    all: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FabricLoaderEntry {
    loader: FabricComponent,
}

#[derive(Debug, Deserialize)]
struct FabricComponent {
    version: String,
    #[serde(default)]
    stable: bool,
}

impl ArtifactFetcher {
    /// Resolves the latest (or pinned) build of `variant` for `version`.
    pub async fn resolve(
        &self,
        variant: Variant,
        version: &str,
        pinned_build: Option<u32>,
    ) -> Result<DownloadDescriptor, ArtifactError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(ArtifactError::not_found(variant, version));
        }

        let descriptor = match variant {
            Variant::Vanilla => self.resolve_vanilla(version).await?,
            Variant::Paper => self.resolve_paper(version, pinned_build).await?,
            Variant::Purpur => self.resolve_purpur(version, pinned_build).await?,
            Variant::Fabric => self.resolve_fabric(version).await?,
            Variant::Forge => {
                return Err(ArtifactError::ManualStepRequired {
                    variant,
                    pointer: self
                        .config
                        .forge_installer_page
                        .replace("{version}", version),
                })
            }
            Variant::Hybrid => {
                return Err(ArtifactError::ManualStepRequired {
                    variant,
                    pointer: self.config.hybrid_installer_page.clone(),
                })
            }
        };

        info!(
            "Resolved {} {} to {} (build {:?})",
            variant, version, descriptor.expected_name, descriptor.build
        );
        Ok(descriptor)
    }

    /// Release ids from the vanilla manifest, newest first.
    pub async fn release_versions(&self) -> Result<Vec<String>, ArtifactError> {
        let url = &self.config.mojang_manifest_url;
        let manifest: VersionManifest = self
            .get_json(url)
            .await?
            .ok_or_else(|| ArtifactError::upstream(url, "manifest not found"))?;
        Ok(manifest
            .versions
            .into_iter()
            .filter(|v| v.kind == "release")
            .map(|v| v.id)
            .collect())
    }

    async fn resolve_vanilla(&self, version: &str) -> Result<DownloadDescriptor, ArtifactError> {
        let manifest_url = &self.config.mojang_manifest_url;
        let manifest: VersionManifest = self
            .get_json(manifest_url)
            .await?
            .ok_or_else(|| ArtifactError::upstream(manifest_url, "manifest not found"))?;

        let entry = manifest
            .versions
            .into_iter()
            .find(|v| v.id == version)
            .ok_or_else(|| ArtifactError::not_found(Variant::Vanilla, version))?;
        debug!("Manifest entry {} ({}) -> {}", entry.id, entry.kind, entry.url);

        let detail: VersionDetail = self
            .get_json(&entry.url)
            .await?
            .ok_or_else(|| ArtifactError::upstream(&entry.url, "version detail not found"))?;

        // Very old releases have no dedicated server download.
        let server = detail
            .downloads
            .get("server")
            .ok_or_else(|| ArtifactError::not_found(Variant::Vanilla, version))?;

        Ok(DownloadDescriptor::new(&server.url, "server.jar").with_size(server.size))
    }

    async fn resolve_paper(
        &self,
        version: &str,
        pinned_build: Option<u32>,
    ) -> Result<DownloadDescriptor, ArtifactError> {
        let base = self.config.paper_api_url.trim_end_matches('/');
        let url = format!("{}/v2/projects/paper/versions/{}/builds", base, version);
        let listing: PaperBuilds = self
            .get_json(&url)
            .await?
            .ok_or_else(|| ArtifactError::not_found(Variant::Paper, version))?;

        let build = match pinned_build {
            Some(pinned) => listing.builds.into_iter().find(|b| b.build == pinned),
            None => listing.builds.into_iter().max_by_key(|b| b.build),
        }
        .ok_or_else(|| ArtifactError::not_found(Variant::Paper, version))?;

        let application = build
            .downloads
            .get("application")
            .ok_or_else(|| ArtifactError::upstream(&url, "build has no application download"))?;

        let download_url = format!(
            "{}/v2/projects/paper/versions/{}/builds/{}/downloads/{}",
            base, version, build.build, application.name
        );
        Ok(DownloadDescriptor::new(download_url, &application.name)
            .with_checksum(application.sha256.clone().map(Checksum::Sha256))
            .with_build(Some(build.build)))
    }

    async fn resolve_purpur(
        &self,
        version: &str,
        pinned_build: Option<u32>,
    ) -> Result<DownloadDescriptor, ArtifactError> {
        let base = self.config.purpur_api_url.trim_end_matches('/');
        let url = format!("{}/v2/purpur/{}", base, version);
        let listing: PurpurVersion = self
            .get_json(&url)
            .await?
            .ok_or_else(|| ArtifactError::not_found(Variant::Purpur, version))?;

        let build = match pinned_build {
            Some(pinned) => {
                let wanted = pinned.to_string();
                if !listing.builds.all.contains(&wanted) {
                    return Err(ArtifactError::not_found(Variant::Purpur, version));
                }
                pinned
            }
            None => listing
                .builds
                .latest
                .parse::<u32>()
                .map_err(|_| ArtifactError::upstream(&url, "latest build is not a number"))?,
        };

        let download_url = format!("{}/v2/purpur/{}/{}/download", base, version, build);
        let name = format!("purpur-{}-{}.jar", version, build);
        Ok(DownloadDescriptor::new(download_url, name).with_build(Some(build)))
    }

    async fn resolve_fabric(&self, version: &str) -> Result<DownloadDescriptor, ArtifactError> {
        let base = self.config.fabric_meta_url.trim_end_matches('/');

        let loaders_url = format!("{}/v2/versions/loader/{}", base, version);
        let loaders: Vec<FabricLoaderEntry> =
            self.get_json(&loaders_url).await?.unwrap_or_default();
        let loader = pick_stable(loaders.into_iter().map(|l| l.loader))
            .ok_or_else(|| ArtifactError::not_found(Variant::Fabric, version))?;

        let installers_url = format!("{}/v2/versions/installer", base);
        let installers: Vec<FabricComponent> = self
            .get_json(&installers_url)
            .await?
            .ok_or_else(|| ArtifactError::upstream(&installers_url, "installer list not found"))?;
        let installer = pick_stable(installers.into_iter())
            .ok_or_else(|| ArtifactError::upstream(&installers_url, "no installer versions"))?;

        let download_url = format!(
            "{}/v2/versions/loader/{}/{}/{}/server/jar",
            base, version, loader.version, installer.version
        );
        let name = format!(
            "fabric-server-mc.{}-loader.{}-launcher.{}.jar",
            version, loader.version, installer.version
        );
        Ok(DownloadDescriptor::new(download_url, name))
    }

    /// GETs JSON. `Ok(None)` on 404; any other failure is upstream trouble.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, ArtifactError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(|e| ArtifactError::upstream(url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ArtifactError::upstream(url, format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| ArtifactError::upstream(url, format!("malformed response: {}", e)))?;
        Ok(Some(body))
    }
}

/// First stable entry, or the first entry when none is marked stable.
fn pick_stable(entries: impl Iterator<Item = FabricComponent>) -> Option<FabricComponent> {
    let mut first = None;
    for entry in entries {
        if entry.stable {
            return Some(entry);
        }
        if first.is_none() {
            first = Some(entry);
        }
    }
    first
}
