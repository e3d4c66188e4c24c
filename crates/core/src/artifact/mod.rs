//! Server artifact resolution and download.
//!
//! [`ArtifactFetcher::resolve`] turns a variant and game version into a
//! [`DownloadDescriptor`] using the variant's metadata API.
//! [`ArtifactFetcher::fetch`] streams the descriptor's URL into a `.part`
//! file next to the destination and renames it into place only after the
//! declared length and checksum have been verified.

mod config;
mod fetcher;
mod resolver;
mod types;

pub use config::UpstreamConfig;
pub use fetcher::ArtifactFetcher;
pub use types::{Checksum, DownloadDescriptor, FetchProgress, FetchResult};

use std::path::PathBuf;
use thiserror::Error;

use crate::profile::Variant;

/// Errors from resolving or downloading a server artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Metadata or download host unreachable, erroring, or returning junk.
    #[error("upstream unavailable ({url}): {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    /// Upstream has no matching version or build.
    #[error("{variant} {version} was not found upstream")]
    VersionNotFound { variant: Variant, version: String },

    /// Connection closed before the declared length arrived.
    #[error("download incomplete: received {received} of {expected} bytes")]
    IncompleteTransfer { expected: u64, received: u64 },

    /// The variant has to be installed by hand.
    #[error("{variant} needs a manual installer step: {pointer}")]
    ManualStepRequired { variant: Variant, pointer: String },

    /// Size or checksum does not match what upstream declared.
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Local file error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub(crate) fn upstream(url: &str, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(variant: Variant, version: &str) -> Self {
        Self::VersionNotFound {
            variant,
            version: version.to_string(),
        }
    }

    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. }
                | Self::IncompleteTransfer { .. }
                | Self::IntegrityMismatch { .. }
        )
    }

    /// Manual-step errors are guidance, everything else aborts the operation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ManualStepRequired { .. })
    }
}
