//! Child process lifecycle.
//!
//! [`ManagedChild`] wraps one spawned process: output routing, readiness
//! detection, graceful stop through stdin, and forced kill. Children are
//! spawned with `kill_on_drop`, so a dropped handle never leaves a process
//! behind. [`ProcessOrchestrator`] runs a whole session: the relay tunnel
//! and the game server side by side, interrupt handling, and teardown of
//! both on every exit path.

mod config;
mod managed;
mod orchestrator;
mod types;

pub use config::{JvmConfig, ShutdownConfig};
pub use managed::ManagedChild;
pub use orchestrator::{ProcessOrchestrator, TunnelCallback};
pub use types::{
    HeapSize, LaunchSpec, ManagedProcess, OutputSink, ProcessKind, ProcessStatus, SessionEnd,
    SessionReport, GAME_READY_MARKER,
};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from launching or controlling child processes.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A heap size like `2G` could not be parsed.
    #[error("invalid heap size '{0}': expected a number with optional K, M or G suffix")]
    InvalidHeapSize(String),

    /// Talking to a running child failed.
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The child has no stdin to write to.
    #[error("process console is not attached")]
    ConsoleUnavailable,
}

impl ProcessError {
    pub(crate) fn launch(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    /// A missing executable is something the operator has to fix.
    pub fn is_missing_executable(&self) -> bool {
        matches!(self, Self::Launch { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
