use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Expected digest of a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "hex", rename_all = "lowercase")]
pub enum Checksum {
    Sha256(String),
}

/// A resolved, downloadable server artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadDescriptor {
    pub url: String,
    /// Upstream file name, informational.
    pub expected_name: String,
    /// Size declared by the metadata API, if any.
    pub expected_size: Option<u64>,
    pub checksum: Option<Checksum>,
    /// Build number chosen for build-based variants.
    pub build: Option<u32>,
}

impl DownloadDescriptor {
    pub fn new(url: impl Into<String>, expected_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_name: expected_name.into(),
            expected_size: None,
            checksum: None,
            build: None,
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.expected_size = size;
        self
    }

    pub fn with_checksum(mut self, checksum: Option<Checksum>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_build(mut self, build: Option<u32>) -> Self {
        self.build = build;
        self
    }
}

/// Outcome of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// An existing valid file was kept and nothing was downloaded.
    pub reused: bool,
}

/// Download progress. `bytes_received` never decreases within one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub bytes_received: u64,
    pub total: Option<u64>,
}

impl FetchProgress {
    pub fn percent(&self) -> Option<f32> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.bytes_received as f32 / total as f32 * 100.0).min(100.0)),
        }
    }
}
