//! Persisted server profile.
//!
//! The profile records which variant and game version the server directory
//! was provisioned with, plus the last public endpoint the relay handed out.
//! It is consulted first on every invocation to decide between creating a
//! new server and resuming an existing one.

mod store;
mod types;

pub use store::{JsonProfileStore, ProfileStore};
pub use types::{EndpointSource, ServerProfile, StoredEndpoint, StoredState, Variant};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the profile store.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No profile has been saved yet.
    #[error("no server profile found at {path}")]
    NotFound { path: PathBuf },

    /// The stored document could not be parsed.
    #[error("profile at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Unknown variant name.
    #[error("unknown server variant: {0}")]
    UnknownVariant(String),

    /// Failed to write the document.
    #[error("failed to write profile: {0}")]
    Write(#[from] crate::server_files::ServerFilesError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
