use std::fmt;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::config::ConfigError;
use crate::process::ProcessError;
use crate::profile::ProfileError;
use crate::provision::ProvisionError;
use crate::server_files::ServerFilesError;
use crate::tunnel::TunnelError;

/// Workflow step, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Configure,
    LoadProfile,
    Provision,
    Resolve,
    Fetch,
    AcceptLicense,
    WriteProperties,
    SaveProfile,
    Tunnel,
    Launch,
    Delete,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Configure => "configuration",
            Step::LoadProfile => "loading the server profile",
            Step::Provision => "installing dependencies",
            Step::Resolve => "resolving the server download",
            Step::Fetch => "downloading the server",
            Step::AcceptLicense => "accepting the license",
            Step::WriteProperties => "writing server.properties",
            Step::SaveProfile => "saving the server profile",
            Step::Tunnel => "opening the tunnel",
            Step::Launch => "running the server",
            Step::Delete => "deleting the server",
        };
        f.write_str(name)
    }
}

/// What the operator should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Run the same command again.
    Retry,
    /// Run again with a different variant, version or setting.
    ChangeInput,
    /// Delete and create the server again.
    RestartFromScratch,
    /// Something has to be done by hand first.
    ManualAction,
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hint = match self {
            Recovery::Retry => "safe to retry",
            Recovery::ChangeInput => "retry with different input",
            Recovery::RestartFromScratch => "delete and create the server again",
            Recovery::ManualAction => "manual action required before retrying",
        };
        f.write_str(hint)
    }
}

/// Underlying module error.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    ServerFiles(#[from] ServerFilesError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
    #[error("interrupted before the server started")]
    Interrupted,
}

impl StepError {
    /// Suggested recovery for this error.
    pub fn recovery(&self) -> Recovery {
        match self {
            StepError::Config(_) => Recovery::ChangeInput,
            StepError::Artifact(e) => match e {
                ArtifactError::VersionNotFound { .. } => Recovery::ChangeInput,
                ArtifactError::ManualStepRequired { .. } => Recovery::ManualAction,
                _ if e.is_retryable() => Recovery::Retry,
                _ => Recovery::ManualAction,
            },
            StepError::Provision(e) => match e {
                ProvisionError::UnknownComponent(_) => Recovery::ChangeInput,
                _ => Recovery::ManualAction,
            },
            StepError::ServerFiles(_) => Recovery::Retry,
            StepError::Profile(e) => match e {
                ProfileError::NotFound { .. } | ProfileError::Corrupt { .. } => {
                    Recovery::RestartFromScratch
                }
                ProfileError::UnknownVariant(_) => Recovery::ChangeInput,
                _ => Recovery::Retry,
            },
            StepError::Process(e) => match e {
                ProcessError::InvalidHeapSize(_) => Recovery::ChangeInput,
                e if e.is_missing_executable() => Recovery::ManualAction,
                _ => Recovery::Retry,
            },
            StepError::Tunnel(TunnelError::InvalidAddress(_) | TunnelError::UnknownRegion(_)) => {
                Recovery::ChangeInput
            }
            StepError::Tunnel(e) if e.is_retryable() => Recovery::Retry,
            StepError::Tunnel(_) => Recovery::ManualAction,
            StepError::Interrupted => Recovery::Retry,
        }
    }
}

/// A failed workflow step.
#[derive(Debug, Error)]
#[error("{step} failed: {source} ({recovery})")]
pub struct WorkflowError {
    pub step: Step,
    pub recovery: Recovery,
    #[source]
    pub source: StepError,
}

impl WorkflowError {
    pub fn new(step: Step, source: impl Into<StepError>) -> Self {
        let source = source.into();
        Self {
            step,
            recovery: source.recovery(),
            source,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.recovery == Recovery::Retry
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.source, StepError::Interrupted)
    }
}

/// Tags a module error with the step it happened in.
pub trait StepResultExt<T> {
    fn at(self, step: Step) -> Result<T, WorkflowError>;
}

impl<T, E: Into<StepError>> StepResultExt<T> for Result<T, E> {
    fn at(self, step: Step) -> Result<T, WorkflowError> {
        self.map_err(|e| WorkflowError::new(step, e))
    }
}
