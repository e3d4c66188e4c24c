//! Runtime dependency provisioning.
//!
//! Each [`Component`] pairs a presence check with an install action.
//! [`EnvironmentProvisioner::ensure`] checks first and installs only when the
//! check fails, at most once per component per process. Only mandatory
//! components abort provisioning when they cannot be made available.

mod component;
mod config;
mod provisioner;
mod state;

pub use component::{parse_java_major, Component, InstallSpec, Presence, RELAY_CLIENT, RUNTIME};
pub use config::ProvisionConfig;
pub use provisioner::{EnvironmentProvisioner, ProvisionReport};
pub use state::ProvisioningState;

use thiserror::Error;

/// Errors from dependency provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A mandatory component is absent and could not be installed.
    #[error("required dependency '{component}' is missing: {reason}")]
    MandatoryDependencyMissing { component: String, reason: String },

    /// No component is registered under this name.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// An install action failed.
    #[error("installing '{component}' failed: {reason}")]
    InstallFailed { component: String, reason: String },
}

impl ProvisionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MandatoryDependencyMissing { .. })
    }
}
