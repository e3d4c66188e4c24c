//! Provisioning and relay-tunnel orchestration for a self-hosted Minecraft
//! server.

pub mod artifact;
pub mod config;
pub mod process;
pub mod profile;
pub mod provision;
pub mod server_files;
pub mod testing;
pub mod tunnel;
pub mod workflow;

pub use artifact::{
    ArtifactError, ArtifactFetcher, Checksum, DownloadDescriptor, FetchProgress, FetchResult,
    UpstreamConfig,
};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, PathsConfig,
};
pub use process::{
    JvmConfig, LaunchSpec, ManagedChild, ManagedProcess, ProcessError, ProcessKind,
    ProcessOrchestrator, ProcessStatus, SessionEnd, SessionReport, ShutdownConfig,
};
pub use profile::{
    EndpointSource, JsonProfileStore, ProfileError, ProfileStore, ServerProfile, StoredEndpoint,
    StoredState, Variant,
};
pub use provision::{
    EnvironmentProvisioner, ProvisionConfig, ProvisionError, ProvisionReport, ProvisioningState,
};
pub use server_files::{ServerConfig, ServerConfigWriter, ServerFilesError, ServerLayout};
pub use tunnel::{
    HttpRelayStatus, Region, RelayConfig, RelayStatusSource, TunnelEndpoint, TunnelError,
    TunnelHandle, TunnelState, TunnelSupervisor,
};
pub use workflow::{
    CreateOutcome, CreateRequest, Recovery, Step, Workflow, WorkflowError,
};
