//! Streaming download into place.

use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::UpstreamConfig;
use super::types::{Checksum, DownloadDescriptor, FetchProgress, FetchResult};
use super::ArtifactError;

/// Resolves and downloads server artifacts.
pub struct ArtifactFetcher {
    pub(super) client: Client,
    pub(super) config: UpstreamConfig,
}

impl ArtifactFetcher {
    pub fn new(config: UpstreamConfig) -> Result<Self, ArtifactError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ArtifactError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Downloads `descriptor` to `dest` unless a valid copy is already there.
    ///
    /// Progress is reported on `progress` without blocking; slow receivers
    /// miss intermediate updates. On any error, or if the returned future is
    /// dropped, the partial download is removed and `dest` is left untouched.
    pub async fn fetch(
        &self,
        descriptor: &DownloadDescriptor,
        dest: &Path,
        progress: Option<mpsc::Sender<FetchProgress>>,
    ) -> Result<FetchResult, ArtifactError> {
        if self.is_valid_artifact(descriptor, dest).await? {
            info!("Keeping existing artifact {:?}", dest);
            return Ok(FetchResult {
                path: dest.to_path_buf(),
                bytes_written: 0,
                reused: true,
            });
        }
        self.download(descriptor, dest, progress).await
    }

    /// Deletes `dest` and downloads it again.
    pub async fn refetch(
        &self,
        descriptor: &DownloadDescriptor,
        dest: &Path,
        progress: Option<mpsc::Sender<FetchProgress>>,
    ) -> Result<FetchResult, ArtifactError> {
        match tokio::fs::remove_file(dest).await {
            Ok(()) => info!("Removed {:?} for re-download", dest),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArtifactError::io(dest, e)),
        }
        self.download(descriptor, dest, progress).await
    }

    /// Checks an on-disk file against the declared size and checksum.
    pub async fn is_valid_artifact(
        &self,
        descriptor: &DownloadDescriptor,
        dest: &Path,
    ) -> Result<bool, ArtifactError> {
        let metadata = match tokio::fs::metadata(dest).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(ArtifactError::io(dest, e)),
        };

        if metadata.len() == 0 {
            return Ok(false);
        }
        if let Some(expected) = descriptor.expected_size {
            if metadata.len() != expected {
                warn!(
                    "Existing {:?} has {} bytes, expected {}; downloading again",
                    dest,
                    metadata.len(),
                    expected
                );
                return Ok(false);
            }
        }
        if let Some(Checksum::Sha256(expected)) = &descriptor.checksum {
            let bytes = tokio::fs::read(dest)
                .await
                .map_err(|e| ArtifactError::io(dest, e))?;
            let actual = format!("{:x}", Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected) {
                warn!("Existing {:?} fails checksum; downloading again", dest);
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn download(
        &self,
        descriptor: &DownloadDescriptor,
        dest: &Path,
        progress: Option<mpsc::Sender<FetchProgress>>,
    ) -> Result<FetchResult, ArtifactError> {
        let url = descriptor.url.as_str();
        info!("Downloading {} -> {:?}", url, dest);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArtifactError::upstream(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::upstream(url, format!("HTTP {}", status.as_u16())));
        }

        let declared = response.content_length().or(descriptor.expected_size);
        let mut part = PartialFile::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(match declared {
                        Some(expected) => {
                            debug!("Stream error after {} bytes: {}", received, e);
                            ArtifactError::IncompleteTransfer { expected, received }
                        }
                        None => ArtifactError::upstream(url, e),
                    })
                }
            };
            part.write(&chunk).await?;
            hasher.update(&chunk);
            received += chunk.len() as u64;

            if let Some(tx) = &progress {
                let _ = tx.try_send(FetchProgress {
                    bytes_received: received,
                    total: declared,
                });
            }
        }

        for expected in [declared, descriptor.expected_size].into_iter().flatten() {
            check_length(expected, received)?;
        }
        if let Some(Checksum::Sha256(expected)) = &descriptor.checksum {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ArtifactError::IntegrityMismatch {
                    expected: format!("sha256 {}", expected),
                    actual: format!("sha256 {}", actual),
                });
            }
        }

        part.persist(dest).await?;
        info!("Downloaded {} bytes to {:?}", received, dest);
        Ok(FetchResult {
            path: dest.to_path_buf(),
            bytes_written: received,
            reused: false,
        })
    }
}

/// `<dest>.part`, removed on drop unless persisted.
struct PartialFile {
    path: PathBuf,
    file: Option<File>,
}

impl PartialFile {
    async fn create(dest: &Path) -> Result<Self, ArtifactError> {
        let mut name = dest.as_os_str().to_owned();
        name.push(".part");
        let path = PathBuf::from(name);

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::io(parent, e))?;
        }
        let file = File::create(&path)
            .await
            .map_err(|e| ArtifactError::io(&path, e))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ArtifactError> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(bytes)
                .await
                .map_err(|e| ArtifactError::io(&self.path, e))?;
        }
        Ok(())
    }

    async fn persist(mut self, dest: &Path) -> Result<(), ArtifactError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| ArtifactError::io(&self.path, e))?;
            file.sync_all()
                .await
                .map_err(|e| ArtifactError::io(&self.path, e))?;
        }
        tokio::fs::rename(&self.path, dest)
            .await
            .map_err(|e| ArtifactError::io(dest, e))?;
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.path.as_os_str().is_empty() {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn check_length(expected: u64, received: u64) -> Result<(), ArtifactError> {
    if received < expected {
        return Err(ArtifactError::IncompleteTransfer { expected, received });
    }
    if received > expected {
        return Err(ArtifactError::IntegrityMismatch {
            expected: format!("{} bytes", expected),
            actual: format!("{} bytes", received),
        });
    }
    Ok(())
}
