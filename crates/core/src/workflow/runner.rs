use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::error::{Step, StepError, StepResultExt, WorkflowError};
use super::types::{CreateOutcome, CreateRequest, DeleteReport, RepairReport, StatusReport};
use crate::artifact::{ArtifactError, ArtifactFetcher, FetchProgress, FetchResult};
use crate::config::{validate_config, Config};
use crate::process::{LaunchSpec, ProcessOrchestrator, SessionReport, TunnelCallback};
use crate::profile::{
    EndpointSource, JsonProfileStore, ProfileError, ProfileStore, ServerProfile, StoredState,
};
use crate::provision::{EnvironmentProvisioner, ProvisionError, ProvisioningState, RELAY_CLIENT};
use crate::server_files::{ServerConfigWriter, ServerFilesError, ServerLayout};
use crate::tunnel::{
    HttpRelayStatus, RelayStatusSource, TunnelEndpoint, TunnelState, TunnelSupervisor,
};

type ProgressSender = Option<mpsc::Sender<FetchProgress>>;

/// Drives the components through create, resume, start and maintenance
/// operations.
pub struct Workflow {
    config: Config,
    layout: ServerLayout,
    store: Arc<dyn ProfileStore>,
    fetcher: ArtifactFetcher,
    provisioner: EnvironmentProvisioner,
    writer: ServerConfigWriter,
    relay_status: Arc<dyn RelayStatusSource>,
}

impl Workflow {
    /// Builds the default component set from a validated configuration.
    pub fn new(config: Config) -> Result<Self, WorkflowError> {
        validate_config(&config).at(Step::Configure)?;

        let layout = ServerLayout::new(config.paths.server_dir());
        let store: Arc<dyn ProfileStore> =
            Arc::new(JsonProfileStore::new(config.paths.state_file()));
        let fetcher = ArtifactFetcher::new(config.upstream.clone()).at(Step::Configure)?;

        let relay_program = config
            .relay
            .enabled
            .then(|| config.paths.resolve_program(&config.relay.program));
        let provisioner = EnvironmentProvisioner::from_config(
            &config.provision,
            &config.jvm,
            relay_program.as_deref(),
        )
        .with_working_dir(&config.paths.root);

        let relay_status: Arc<dyn RelayStatusSource> = Arc::new(
            HttpRelayStatus::new(
                config.relay.status_url.clone(),
                Duration::from_millis(config.relay.status_timeout_ms),
            )
            .at(Step::Configure)?,
        );

        Ok(Self {
            config,
            layout,
            store,
            fetcher,
            provisioner,
            writer: ServerConfigWriter::new(),
            relay_status,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_provisioner(mut self, provisioner: EnvironmentProvisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_relay_status(mut self, source: Arc<dyn RelayStatusSource>) -> Self {
        self.relay_status = source;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &ServerLayout {
        &self.layout
    }

    /// Versions to offer: the configured list, or release ids from the
    /// vanilla manifest when `remote` is set.
    pub async fn versions(&self, remote: bool) -> Result<Vec<String>, WorkflowError> {
        if remote {
            self.fetcher.release_versions().await.at(Step::Resolve)
        } else {
            Ok(self.config.upstream.suggested_versions.clone())
        }
    }

    /// Provisions dependencies, downloads the jar, writes the server files
    /// and saves a new profile, replacing any previous one.
    ///
    /// Variants that need a manual installer still get their directory and
    /// profile; the outcome carries the pointer to follow.
    pub async fn create(
        &self,
        request: &CreateRequest,
        progress: ProgressSender,
    ) -> Result<CreateOutcome, WorkflowError> {
        info!(
            "Creating {} {} server in {:?}",
            request.variant,
            request.version,
            self.layout.dir()
        );

        let provision = self.provisioner.ensure_all().await.at(Step::Provision)?;
        self.ensure_server_dir().await?;

        let (descriptor, fetch, manual_step) = match self
            .fetcher
            .resolve(request.variant, &request.version, request.pinned_build)
            .await
        {
            Ok(descriptor) => {
                let dest = self.layout.jar_path(request.variant);
                let fetch = if request.force_download {
                    self.fetcher.refetch(&descriptor, &dest, progress).await
                } else {
                    self.fetcher.fetch(&descriptor, &dest, progress).await
                }
                .at(Step::Fetch)?;
                (Some(descriptor), Some(fetch), None)
            }
            Err(ArtifactError::ManualStepRequired { variant, pointer }) => {
                warn!(
                    "{} must be installed by hand: {} (place the server jar at {:?})",
                    variant,
                    pointer,
                    self.layout.jar_path(variant)
                );
                (None, None, Some(pointer))
            }
            Err(e) => return Err(WorkflowError::new(Step::Resolve, e)),
        };

        self.write_license()?;
        self.write_properties()?;

        let profile = ServerProfile::new(request.variant, request.version.clone())
            .with_pinned_build(request.pinned_build);
        self.store.save(&profile).at(Step::SaveProfile)?;

        Ok(CreateOutcome {
            profile,
            provision,
            descriptor,
            fetch,
            manual_step,
            server_dir: self.layout.dir().to_path_buf(),
        })
    }

    /// Loads the stored profile and re-runs only the steps whose results are
    /// missing on disk.
    pub async fn resume(
        &self,
        progress: ProgressSender,
    ) -> Result<(StoredState, RepairReport), WorkflowError> {
        let stored = self.load_profile()?;
        let variant = stored.profile.variant();
        let before = ProvisioningState::inspect(&self.layout, variant);
        let mut report = RepairReport {
            repaired: Vec::new(),
            before: before.clone(),
        };

        for component in self.provisioner.components().iter().filter(|c| c.mandatory) {
            self.provisioner
                .ensure(&component.name)
                .await
                .at(Step::Provision)?;
        }

        if !before.server_binary_present {
            info!("Server jar missing, downloading it again");
            self.ensure_server_dir().await?;
            self.fetch_for(&stored.profile, progress).await?;
            report.repaired.push(Step::Fetch);
        }
        if !before.license_accepted {
            self.write_license()?;
            report.repaired.push(Step::AcceptLicense);
        }
        if !before.properties_written {
            self.write_properties()?;
            report.repaired.push(Step::WriteProperties);
        }

        if report.was_complete() {
            info!("Server directory is complete");
        } else {
            info!("Repaired: {:?}", report.repaired);
        }
        Ok((stored, report))
    }

    /// Resumes, then runs the game server (and relay, if enabled) until it
    /// exits or `interrupts` asks it to stop.
    ///
    /// An interrupt during the resume phase abandons it: a download in
    /// flight is dropped along with its partial file and nothing launches.
    pub async fn start(
        &self,
        mut interrupts: mpsc::Receiver<()>,
        console: Option<mpsc::Receiver<String>>,
        progress: ProgressSender,
    ) -> Result<SessionReport, WorkflowError> {
        let (stored, _) = tokio::select! {
            resumed = self.resume(progress) => resumed?,
            Some(()) = interrupts.recv() => {
                warn!("Interrupted while preparing the server; not starting it");
                return Err(WorkflowError::new(Step::Launch, StepError::Interrupted));
            }
        };
        let spec = self.launch_spec(&stored.profile)?;

        let tunnel = if self.config.relay.enabled {
            // Relay endpoints don't survive restarts.
            if let Err(e) = self.store.invalidate_endpoint() {
                warn!("Could not mark the previous endpoint stale: {}", e);
            }
            self.tunnel_supervisor().await
        } else {
            None
        };

        let orchestrator = ProcessOrchestrator::new(self.config.shutdown.clone())
            .with_tunnel_callback(self.endpoint_recorder());
        orchestrator
            .run(&spec, tunnel, interrupts, console)
            .await
            .at(Step::Launch)
    }

    /// The command line `start` would run, for starting the server by hand.
    pub fn show_command(&self) -> Result<String, WorkflowError> {
        let stored = self.load_profile()?;
        Ok(self.launch_spec(&stored.profile)?.display_command())
    }

    /// Stores an endpoint typed by the operator, e.g. from a relay dashboard.
    pub fn set_manual_endpoint(&self, address: &str) -> Result<TunnelEndpoint, WorkflowError> {
        let endpoint =
            TunnelEndpoint::from_public_url(address, self.config.relay.region).at(Step::Tunnel)?;
        self.store
            .record_endpoint(&endpoint, EndpointSource::Manual)
            .at(Step::SaveProfile)?;
        Ok(endpoint)
    }

    pub async fn status(&self) -> Result<StatusReport, WorkflowError> {
        let stored = self.store.load().at(Step::LoadProfile)?;
        let state = match &stored {
            Some(s) => ProvisioningState::inspect(&self.layout, s.profile.variant()),
            None => ProvisioningState::default(),
        }
        .with_dependencies(self.provisioner.present_components().await);

        Ok(StatusReport {
            stored,
            state,
            java_major: self.provisioner.java_version().await,
            server_dir: self.layout.dir().to_path_buf(),
            relay_enabled: self.config.relay.enabled,
            relay_log: self.config.paths.relay_log(),
        })
    }

    /// Removes the server directory, stored profile and relay log.
    pub async fn delete(&self) -> Result<DeleteReport, WorkflowError> {
        let mut report = DeleteReport::default();

        let dir = self.layout.dir();
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => report.removed.push(dir.to_path_buf()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WorkflowError::new(Step::Delete, ServerFilesError::io(dir, e))),
        }

        let state_file = self.config.paths.state_file();
        if state_file.exists() {
            report.removed.push(state_file);
        }
        self.store.clear().at(Step::Delete)?;

        let log = self.config.paths.relay_log();
        match tokio::fs::remove_file(&log).await {
            Ok(()) => report.removed.push(log),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WorkflowError::new(Step::Delete, ServerFilesError::io(&log, e))),
        }

        info!("Deleted {} item(s)", report.removed.len());
        Ok(report)
    }

    fn load_profile(&self) -> Result<StoredState, WorkflowError> {
        self.store.load().at(Step::LoadProfile)?.ok_or_else(|| {
            WorkflowError::new(
                Step::LoadProfile,
                ProfileError::NotFound {
                    path: self.config.paths.state_file(),
                },
            )
        })
    }

    fn launch_spec(&self, profile: &ServerProfile) -> Result<LaunchSpec, WorkflowError> {
        LaunchSpec::game_server(&self.layout, profile.variant(), &self.config.jvm).at(Step::Launch)
    }

    async fn fetch_for(
        &self,
        profile: &ServerProfile,
        progress: ProgressSender,
    ) -> Result<FetchResult, WorkflowError> {
        let descriptor = self
            .fetcher
            .resolve(profile.variant(), profile.game_version(), profile.pinned_build())
            .await
            .at(Step::Resolve)?;
        self.fetcher
            .fetch(&descriptor, &self.layout.jar_path(profile.variant()), progress)
            .await
            .at(Step::Fetch)
    }

    async fn ensure_server_dir(&self) -> Result<(), WorkflowError> {
        let dir = self.layout.dir();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| WorkflowError::new(Step::Fetch, ServerFilesError::io(dir, e)))
    }

    fn write_license(&self) -> Result<(), WorkflowError> {
        self.writer
            .write_license_acceptance(&self.layout.eula_path())
            .at(Step::AcceptLicense)
    }

    fn write_properties(&self) -> Result<(), WorkflowError> {
        self.writer
            .write_properties(
                &self.layout.properties_path(),
                &self.config.server.effective_properties(),
            )
            .at(Step::WriteProperties)
    }

    async fn tunnel_supervisor(&self) -> Option<TunnelSupervisor> {
        match self.provisioner.ensure(RELAY_CLIENT).await {
            Ok(true) | Err(ProvisionError::UnknownComponent(_)) => {}
            Ok(false) => {
                warn!("Relay client unavailable; starting without a public endpoint");
                return None;
            }
            Err(e) => {
                warn!("Relay client unavailable ({}); starting without a public endpoint", e);
                return None;
            }
        }

        let program = self.config.paths.resolve_program(&self.config.relay.program);
        Some(
            TunnelSupervisor::new(
                self.config.relay.clone(),
                self.relay_status.clone(),
                self.config.paths.relay_log(),
                self.config.server.port,
            )
            .with_program(program),
        )
    }

    fn endpoint_recorder(&self) -> TunnelCallback {
        let store = self.store.clone();
        Arc::new(move |state: &TunnelState| {
            let result = match state {
                TunnelState::EndpointAssigned { endpoint, .. } => {
                    store.record_endpoint(endpoint, EndpointSource::Relay)
                }
                TunnelState::Stopped { .. } => store.invalidate_endpoint().map(|_| ()),
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!("Could not persist tunnel state {}: {}", state.name(), e);
            }
        })
    }
}
