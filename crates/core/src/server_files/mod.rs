//! On-disk files the game server reads at startup.
//!
//! Everything here is deterministic and offline: the license acceptance
//! file, `server.properties`, and the directory layout that ties them to
//! the downloaded jar. Every write goes through [`write_atomically`] so a
//! crash mid-write never leaves a truncated file behind.

mod atomic;
mod config;
mod layout;
mod writer;

pub use atomic::write_atomically;
pub use config::ServerConfig;
pub use layout::ServerLayout;
pub use writer::{parse_properties, render_properties, ServerConfigWriter, LICENSE_ACCEPTANCE};

use std::path::PathBuf;
use thiserror::Error;

/// Errors writing server files.
#[derive(Debug, Error)]
pub enum ServerFilesError {
    /// Destination has no parent directory to stage the write in.
    #[error("invalid destination path: {path}")]
    InvalidPath { path: PathBuf },

    /// Writing or renaming failed.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServerFilesError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
