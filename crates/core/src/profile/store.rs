//! JSON-file profile store.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::types::{EndpointSource, ServerProfile, StoredEndpoint, StoredState};
use super::ProfileError;
use crate::server_files::write_atomically;
use crate::tunnel::TunnelEndpoint;

/// Persistence for the server profile and its derived tunnel state.
///
/// A single orchestrator instance is assumed; writes are atomic replaces,
/// no locking is done.
pub trait ProfileStore: Send + Sync {
    /// Loads the stored document, `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<StoredState>, ProfileError>;

    /// Saves a new profile, replacing any previous one and its endpoint.
    fn save(&self, profile: &ServerProfile) -> Result<(), ProfileError>;

    /// Records a freshly obtained endpoint as valid.
    fn record_endpoint(
        &self,
        endpoint: &TunnelEndpoint,
        source: EndpointSource,
    ) -> Result<(), ProfileError>;

    /// Marks the stored endpoint stale. Returns whether one was valid.
    fn invalidate_endpoint(&self) -> Result<bool, ProfileError>;

    /// Removes the stored document.
    fn clear(&self) -> Result<(), ProfileError>;
}

/// Profile store backed by a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, state: &StoredState) -> Result<(), ProfileError> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| ProfileError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        write_atomically(&self.path, &json)?;
        Ok(())
    }

    fn load_existing(&self) -> Result<StoredState, ProfileError> {
        self.load()?.ok_or_else(|| ProfileError::NotFound {
            path: self.path.clone(),
        })
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self) -> Result<Option<StoredState>, ProfileError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProfileError::Io(e)),
        };

        let state: StoredState =
            serde_json::from_slice(&bytes).map_err(|e| ProfileError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "Loaded profile {} {} from {:?}",
            state.profile.variant(),
            state.profile.game_version(),
            self.path
        );
        Ok(Some(state))
    }

    fn save(&self, profile: &ServerProfile) -> Result<(), ProfileError> {
        let state = StoredState {
            profile: profile.clone(),
            tunnel: None,
        };
        self.write(&state)?;
        info!(
            "Saved profile {} {} to {:?}",
            profile.variant(),
            profile.game_version(),
            self.path
        );
        Ok(())
    }

    fn record_endpoint(
        &self,
        endpoint: &TunnelEndpoint,
        source: EndpointSource,
    ) -> Result<(), ProfileError> {
        let mut state = self.load_existing()?;
        state.tunnel = Some(StoredEndpoint {
            endpoint: endpoint.clone(),
            source,
            valid: true,
        });
        self.write(&state)?;
        info!("Recorded endpoint {} ({:?})", endpoint, source);
        Ok(())
    }

    fn invalidate_endpoint(&self) -> Result<bool, ProfileError> {
        let Some(mut state) = self.load()? else {
            return Ok(false);
        };
        let was_valid = match state.tunnel.as_mut() {
            Some(stored) if stored.valid => {
                stored.valid = false;
                true
            }
            _ => false,
        };
        if was_valid {
            self.write(&state)?;
            debug!("Marked stored endpoint stale");
        }
        Ok(was_valid)
    }

    fn clear(&self) -> Result<(), ProfileError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProfileError::Io(e)),
        }
    }
}
