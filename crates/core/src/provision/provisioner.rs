use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::component::{parse_java_major, Component, InstallSpec, Presence, RELAY_CLIENT, RUNTIME};
use super::config::ProvisionConfig;
use super::ProvisionError;
use crate::process::JvmConfig;
use crate::server_files::write_atomically;

/// Outcome of [`EnvironmentProvisioner::ensure_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub available: BTreeSet<String>,
    pub missing_optional: Vec<String>,
}

/// Checks for and installs runtime dependencies.
pub struct EnvironmentProvisioner {
    components: Vec<Component>,
    attempted: Mutex<HashSet<String>>,
    working_dir: Option<PathBuf>,
    client: reqwest::Client,
}

impl EnvironmentProvisioner {
    pub fn new(components: Vec<Component>) -> Self {
        Self {
            components,
            attempted: Mutex::new(HashSet::new()),
            working_dir: None,
            client: reqwest::Client::new(),
        }
    }

    /// Install commands run inside `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Standard component set: Java runtime (mandatory), relay client and
    /// convenience tools (optional). Pass `None` for `relay_program` when no
    /// tunnel is wanted.
    pub fn from_config(
        config: &ProvisionConfig,
        jvm: &JvmConfig,
        relay_program: Option<&Path>,
    ) -> Self {
        let mut components = Vec::new();

        let runtime_install = (!config.runtime_install.is_empty())
            .then(|| InstallSpec::Command(config.runtime_install.clone()));
        components.push(
            Component::mandatory(
                RUNTIME,
                Presence::JavaRuntime {
                    java: jvm.java_path.clone(),
                    min_major: config.min_java_major,
                },
            )
            .with_install(runtime_install),
        );

        if let Some(program) = relay_program {
            let presence = if program.components().count() > 1 {
                Presence::Path(program.to_path_buf())
            } else {
                on_path(&program.to_string_lossy())
            };
            let install = match &config.relay_download_url {
                Some(url) => Some(InstallSpec::Download {
                    url: url.clone(),
                    dest: program.to_path_buf(),
                }),
                None if !config.relay_install.is_empty() => {
                    Some(InstallSpec::Command(config.relay_install.clone()))
                }
                None => None,
            };
            components.push(Component::optional(RELAY_CLIENT, presence).with_install(install));
        }

        for tool in &config.tools {
            let install = (!config.tool_install.is_empty()).then(|| {
                let mut argv = config.tool_install.clone();
                argv.push(tool.clone());
                InstallSpec::Command(argv)
            });
            components.push(Component::optional(tool, on_path(tool)).with_install(install));
        }

        Self::new(components)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    fn component(&self, name: &str) -> Result<&Component, ProvisionError> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ProvisionError::UnknownComponent(name.to_string()))
    }

    /// Makes `name` available, installing it at most once.
    ///
    /// Returns whether the component is available afterwards. Only mandatory
    /// components turn a failure into an error.
    pub async fn ensure(&self, name: &str) -> Result<bool, ProvisionError> {
        let component = self.component(name)?;
        let mut attempted = self.attempted.lock().await;

        if self.is_present(component).await {
            debug!("{} already present", name);
            return Ok(true);
        }
        if !attempted.insert(name.to_string()) {
            return self.missing(component, "install already attempted in this run".to_string());
        }

        let Some(install) = &component.install else {
            return self.missing(component, "no install method configured".to_string());
        };

        info!("Installing {}", name);
        if let Err(e) = self.install(component, install).await {
            return self.missing(component, e.to_string());
        }

        if self.is_present(component).await {
            info!("Installed {}", name);
            Ok(true)
        } else {
            self.missing(component, "still not detected after install".to_string())
        }
    }

    /// Ensures every component in registration order.
    pub async fn ensure_all(&self) -> Result<ProvisionReport, ProvisionError> {
        let mut report = ProvisionReport::default();
        for component in &self.components {
            if self.ensure(&component.name).await? {
                report.available.insert(component.name.clone());
            } else {
                report.missing_optional.push(component.name.clone());
            }
        }
        Ok(report)
    }

    /// Names of components whose presence check currently passes.
    pub async fn present_components(&self) -> BTreeSet<String> {
        let mut present = BTreeSet::new();
        for component in &self.components {
            if self.is_present(component).await {
                present.insert(component.name.clone());
            }
        }
        present
    }

    /// Java major version reported by the runtime component's executable.
    pub async fn java_version(&self) -> Option<u32> {
        let java = self.components.iter().find_map(|c| match &c.presence {
            Presence::JavaRuntime { java, .. } => Some(java.clone()),
            _ => None,
        })?;
        java_major(&java).await
    }

    fn missing(&self, component: &Component, reason: String) -> Result<bool, ProvisionError> {
        if component.mandatory {
            Err(ProvisionError::MandatoryDependencyMissing {
                component: component.name.clone(),
                reason,
            })
        } else {
            warn!("Optional component {} unavailable: {}", component.name, reason);
            Ok(false)
        }
    }

    async fn is_present(&self, component: &Component) -> bool {
        match &component.presence {
            Presence::Path(path) => tokio::fs::metadata(path).await.is_ok(),
            Presence::Command { program, args } => Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|status| status.success())
                .unwrap_or(false),
            Presence::JavaRuntime { java, min_major } => match java_major(java).await {
                Some(major) if major >= *min_major => true,
                Some(major) => {
                    warn!("Java {} found, {} or newer is required", major, min_major);
                    false
                }
                None => false,
            },
        }
    }

    async fn install(&self, component: &Component, spec: &InstallSpec) -> Result<(), ProvisionError> {
        let failed = |reason: String| ProvisionError::InstallFailed {
            component: component.name.clone(),
            reason,
        };

        match spec {
            InstallSpec::Command(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| failed("empty install command".to_string()))?;
                let mut cmd = Command::new(program);
                cmd.args(args).stdin(Stdio::null());
                if let Some(dir) = &self.working_dir {
                    cmd.current_dir(dir);
                }

                let output = cmd.output().await.map_err(|e| failed(e.to_string()))?;
                debug!(
                    "{} install output: {}",
                    component.name,
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(failed(format!("{}: {}", output.status, stderr.trim())));
                }
                Ok(())
            }
            InstallSpec::Download { url, dest } => {
                let dest = match (&self.working_dir, dest.is_relative()) {
                    (Some(dir), true) => dir.join(dest),
                    _ => dest.clone(),
                };
                let response = self
                    .client
                    .get(url)
                    .timeout(Duration::from_secs(300))
                    .send()
                    .await
                    .map_err(|e| failed(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(failed(format!("{} returned {}", url, response.status())));
                }
                let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
                write_atomically(&dest, &bytes).map_err(|e| failed(e.to_string()))?;
                make_executable(&dest).map_err(|e| failed(e.to_string()))?;
                info!("Downloaded {} ({} bytes) to {:?}", component.name, bytes.len(), dest);
                Ok(())
            }
        }
    }
}

fn on_path(name: &str) -> Presence {
    Presence::Command {
        program: PathBuf::from("sh"),
        args: vec!["-c".to_string(), format!("command -v '{}'", name.replace('\'', ""))],
    }
}

async fn java_major(java: &Path) -> Option<u32> {
    let output = Command::new(java)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    // `java -version` prints to stderr.
    parse_java_major(&String::from_utf8_lossy(&output.stderr))
        .or_else(|| parse_java_major(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use httpmock::prelude::*;

    fn counting_component(dir: &Path, mandatory: bool, creates_marker: bool) -> Component {
        let marker = dir.join("installed.marker");
        let counter = dir.join("install.count");
        let script = if creates_marker {
            format!("echo x >> '{}'; touch '{}'", counter.display(), marker.display())
        } else {
            format!("echo x >> '{}'", counter.display())
        };
        let component = if mandatory {
            Component::mandatory("thing", Presence::Path(marker))
        } else {
            Component::optional("thing", Presence::Path(marker))
        };
        component.with_install(Some(InstallSpec::Command(vec![
            "sh".to_string(),
            "-c".to_string(),
            script,
        ])))
    }

    fn install_count(dir: &Path) -> usize {
        std::fs::read_to_string(dir.join("install.count"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_ensure_twice_installs_once() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = EnvironmentProvisioner::new(vec![counting_component(dir.path(), true, true)]);

        assert!(provisioner.ensure("thing").await.unwrap());
        assert!(provisioner.ensure("thing").await.unwrap());
        assert_eq!(install_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_present_component_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("installed.marker"), b"").unwrap();
        let provisioner = EnvironmentProvisioner::new(vec![counting_component(dir.path(), true, true)]);

        assert!(provisioner.ensure("thing").await.unwrap());
        assert_eq!(install_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_ineffective_install_is_not_repeated() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = EnvironmentProvisioner::new(vec![counting_component(dir.path(), true, false)]);

        let first = provisioner.ensure("thing").await.unwrap_err();
        assert!(first.is_fatal());
        let second = provisioner.ensure("thing").await.unwrap_err();
        assert!(matches!(second, ProvisionError::MandatoryDependencyMissing { .. }));
        assert_eq!(install_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_optional_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = EnvironmentProvisioner::new(vec![
            Component::mandatory("present", Presence::Path(dir.path().to_path_buf())),
            Component::optional("absent", Presence::Path(dir.path().join("nope"))).with_install(Some(
                InstallSpec::Command(vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()]),
            )),
        ]);

        assert!(!provisioner.ensure("absent").await.unwrap());
        let report = provisioner.ensure_all().await.unwrap();
        assert!(report.available.contains("present"));
        assert_eq!(report.missing_optional, vec!["absent"]);
    }

    #[tokio::test]
    async fn test_unknown_component() {
        let provisioner = EnvironmentProvisioner::new(Vec::new());
        assert!(matches!(
            provisioner.ensure("nothing").await,
            Err(ProvisionError::UnknownComponent(_))
        ));
    }

    #[tokio::test]
    async fn test_java_check_reads_version() {
        let dir = tempfile::tempdir().unwrap();
        let java = fixtures::write_script(
            dir.path(),
            "java",
            "echo 'openjdk version \"17.0.9\" 2023-10-17' >&2",
        );

        let ok = EnvironmentProvisioner::new(vec![Component::mandatory(
            RUNTIME,
            Presence::JavaRuntime {
                java: java.clone(),
                min_major: 17,
            },
        )]);
        assert!(ok.ensure(RUNTIME).await.unwrap());
        assert_eq!(ok.java_version().await, Some(17));

        let too_old = EnvironmentProvisioner::new(vec![Component::mandatory(
            RUNTIME,
            Presence::JavaRuntime { java, min_major: 21 },
        )]);
        assert!(too_old.ensure(RUNTIME).await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_download_install_makes_executable() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/playit-linux_64");
            then.status(200).body("#!/bin/sh\necho relay\n");
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("playit");
        let provisioner = EnvironmentProvisioner::new(vec![Component::optional(
            RELAY_CLIENT,
            Presence::Path(dest.clone()),
        )
        .with_install(Some(InstallSpec::Download {
            url: server.url("/playit-linux_64"),
            dest: dest.clone(),
        }))]);

        assert!(provisioner.ensure(RELAY_CLIENT).await.unwrap());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_from_config_component_set() {
        let provisioner = EnvironmentProvisioner::from_config(
            &ProvisionConfig::default(),
            &JvmConfig::default(),
            Some(Path::new("./ngrok")),
        );
        let names: Vec<_> = provisioner.components().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![RUNTIME, RELAY_CLIENT, "curl", "wget", "unzip"]);
        assert!(provisioner.components()[0].mandatory);
        assert!(provisioner.components()[1..].iter().all(|c| !c.mandatory));
        assert_eq!(
            provisioner.components()[1].presence,
            Presence::Path(PathBuf::from("./ngrok"))
        );

        let no_relay = EnvironmentProvisioner::from_config(
            &ProvisionConfig::default(),
            &JvmConfig::default(),
            None,
        );
        assert!(no_relay.component(RELAY_CLIENT).is_err());
    }
}
