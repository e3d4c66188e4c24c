use std::path::PathBuf;

use super::Step;
use crate::artifact::{DownloadDescriptor, FetchResult};
use crate::profile::{ServerProfile, StoredState, Variant};
use crate::provision::{ProvisionReport, ProvisioningState};

/// Input for creating a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub variant: Variant,
    pub version: String,
    pub pinned_build: Option<u32>,
    /// Delete an existing jar and download it again.
    pub force_download: bool,
}

impl CreateRequest {
    pub fn new(variant: Variant, version: impl Into<String>) -> Self {
        Self {
            variant,
            version: version.into(),
            pinned_build: None,
            force_download: false,
        }
    }

    pub fn pinned_build(mut self, build: Option<u32>) -> Self {
        self.pinned_build = build;
        self
    }

    pub fn force_download(mut self, force: bool) -> Self {
        self.force_download = force;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub profile: ServerProfile,
    pub provision: ProvisionReport,
    pub descriptor: Option<DownloadDescriptor>,
    pub fetch: Option<FetchResult>,
    /// Set when the jar has to be installed by hand.
    pub manual_step: Option<String>,
    pub server_dir: PathBuf,
}

/// What `resume` had to redo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub repaired: Vec<Step>,
    pub before: ProvisioningState,
}

impl RepairReport {
    pub fn was_complete(&self) -> bool {
        self.repaired.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub stored: Option<StoredState>,
    pub state: ProvisioningState,
    pub java_major: Option<u32>,
    pub server_dir: PathBuf,
    pub relay_enabled: bool,
    pub relay_log: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub removed: Vec<PathBuf>,
}
