//! Workflow integration tests.
//!
//! Upstream APIs are served by httpmock, the relay status API is scripted,
//! and `java` and the relay client are shell scripts in a temp directory.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use tempfile::TempDir;
use tokio::sync::mpsc;

use craftgate_core::{
    testing::{fixtures, MockRelayStatus},
    tunnel::RelayTunnel,
    Config, CreateRequest, EndpointSource, EnvironmentProvisioner, ProcessStatus, Recovery,
    SessionEnd, Step, UpstreamConfig, Variant, Workflow,
};

const VERSION: &str = "1.20.4";
const JAR: &[u8] = b"not really a server jar";

/// Test helper owning the temp root and the mock upstream.
struct TestHarness {
    root: TempDir,
    server: MockServer,
    relay: Arc<MockRelayStatus>,
}

impl TestHarness {
    async fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            server: MockServer::start_async().await,
            relay: Arc::new(MockRelayStatus::new()),
        }
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.paths.root = self.root.path().to_path_buf();
        config.upstream = UpstreamConfig::with_base_url(&self.server.base_url());
        config.shutdown.grace_period_secs = 5;
        config.relay.enabled = false;
        config
    }

    fn workflow(&self, config: Config) -> Workflow {
        Workflow::new(config)
            .unwrap()
            .with_provisioner(EnvironmentProvisioner::new(vec![]))
            .with_relay_status(self.relay.clone())
    }

    /// Serves the vanilla manifest, detail and jar; returns the jar mock.
    async fn serve_vanilla(&self) -> httpmock::Mock<'_> {
        let base = self.server.base_url();
        self.server
            .mock_async(|when, then| {
                when.method(GET).path("/mc/game/version_manifest_v2.json");
                then.status(200)
                    .json_body(fixtures::vanilla_manifest(&base, &[VERSION, "1.20.2"]));
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/v1/packages/{}.json", VERSION));
                then.status(200).json_body(fixtures::vanilla_detail(
                    &base,
                    VERSION,
                    JAR.len() as u64,
                ));
            })
            .await;
        self.server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/v1/objects/{}/server.jar", VERSION));
                then.status(200).body(JAR);
            })
            .await
    }

    fn server_dir(&self) -> std::path::PathBuf {
        self.root.path().join("minecraft_server")
    }
}

#[tokio::test]
async fn test_create_vanilla_writes_server_directory() {
    let harness = TestHarness::new().await;
    let jar = harness.serve_vanilla().await;
    let workflow = harness.workflow(harness.config());

    let outcome = workflow
        .create(&CreateRequest::new(Variant::Vanilla, VERSION), None)
        .await
        .unwrap();

    jar.assert_async().await;
    let fetch = outcome.fetch.unwrap();
    assert!(!fetch.reused);
    assert_eq!(fetch.bytes_written, JAR.len() as u64);
    assert_eq!(outcome.manual_step, None);

    let dir = harness.server_dir();
    assert_eq!(std::fs::read(dir.join("server.jar")).unwrap(), JAR);
    assert_eq!(std::fs::read(dir.join("eula.txt")).unwrap(), b"eula=true\n");
    let properties = std::fs::read_to_string(dir.join("server.properties")).unwrap();
    assert!(properties.contains("server-port=25565"));
    assert!(!dir.join("server.jar.part").exists());

    let status = workflow.status().await.unwrap();
    let stored = status.stored.unwrap();
    assert_eq!(stored.profile.variant(), Variant::Vanilla);
    assert_eq!(stored.profile.game_version(), VERSION);
    assert!(status.state.server_ready());
}

#[tokio::test]
async fn test_create_twice_reuses_valid_jar() {
    let harness = TestHarness::new().await;
    let jar = harness.serve_vanilla().await;
    let workflow = harness.workflow(harness.config());
    let request = CreateRequest::new(Variant::Vanilla, VERSION);

    workflow.create(&request, None).await.unwrap();
    let second = workflow.create(&request, None).await.unwrap();
    assert!(second.fetch.unwrap().reused);
    jar.assert_hits_async(1).await;

    let forced = workflow
        .create(&request.clone().force_download(true), None)
        .await
        .unwrap();
    assert!(!forced.fetch.unwrap().reused);
    jar.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_create_unknown_version_asks_for_other_input() {
    let harness = TestHarness::new().await;
    harness.serve_vanilla().await;
    let workflow = harness.workflow(harness.config());

    let err = workflow
        .create(&CreateRequest::new(Variant::Vanilla, "0.0.1"), None)
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::Resolve);
    assert_eq!(err.recovery, Recovery::ChangeInput);
    assert!(workflow.status().await.unwrap().stored.is_none());
}

#[tokio::test]
async fn test_create_forge_reports_manual_step() {
    let harness = TestHarness::new().await;
    let any = harness
        .server
        .mock_async(|when, then| {
            when.any_request();
            then.status(500);
        })
        .await;
    let workflow = harness.workflow(harness.config());

    let outcome = workflow
        .create(&CreateRequest::new(Variant::Forge, "1.20.1"), None)
        .await
        .unwrap();

    any.assert_hits_async(0).await;
    assert!(outcome.fetch.is_none());
    let pointer = outcome.manual_step.unwrap();
    assert!(pointer.contains("index_1.20.1.html"), "pointer: {}", pointer);

    // Directory and files are prepared; only the jar is missing.
    let status = workflow.status().await.unwrap();
    assert_eq!(
        status.stored.map(|s| s.profile.variant()),
        Some(Variant::Forge)
    );
    assert!(status.state.config_written());
    assert!(!status.state.server_binary_present);
}

#[tokio::test]
async fn test_resume_repairs_only_missing_steps() {
    let harness = TestHarness::new().await;
    let jar = harness.serve_vanilla().await;
    let workflow = harness.workflow(harness.config());
    workflow
        .create(&CreateRequest::new(Variant::Vanilla, VERSION), None)
        .await
        .unwrap();

    let (_, report) = workflow.resume(None).await.unwrap();
    assert!(report.was_complete());

    let dir = harness.server_dir();
    std::fs::remove_file(dir.join("server.jar")).unwrap();
    std::fs::write(dir.join("eula.txt"), "eula=false\n").unwrap();
    std::fs::write(dir.join("server.properties"), "motd=kept\n").unwrap();

    let (stored, report) = workflow.resume(None).await.unwrap();
    assert_eq!(stored.profile.variant(), Variant::Vanilla);
    assert_eq!(report.repaired, vec![Step::Fetch, Step::AcceptLicense]);
    assert!(!report.before.server_binary_present);
    assert!(!report.before.license_accepted);
    jar.assert_hits_async(2).await;

    assert_eq!(std::fs::read(dir.join("eula.txt")).unwrap(), b"eula=true\n");
    assert_eq!(
        std::fs::read_to_string(dir.join("server.properties")).unwrap(),
        "motd=kept\n"
    );
}

#[tokio::test]
async fn test_resume_without_profile_restarts_from_scratch() {
    let harness = TestHarness::new().await;
    let workflow = harness.workflow(harness.config());

    let err = workflow.resume(None).await.unwrap_err();
    assert_eq!(err.step, Step::LoadProfile);
    assert_eq!(err.recovery, Recovery::RestartFromScratch);
}

#[tokio::test]
async fn test_start_runs_game_with_relay_and_records_endpoint() {
    let harness = TestHarness::new().await;
    harness.serve_vanilla().await;
    harness
        .relay
        .set_fallback(vec![RelayTunnel::new("tcp://0.tcp.ngrok.io:54321")])
        .await;

    let bin = harness.root.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let java = fixtures::write_script(
        &bin,
        "java",
        "echo 'Done (0.42s)! For help, type \"help\"'\n\
         while read line; do [ \"$line\" = stop ] && exit 0; done",
    );
    let relay = fixtures::write_script(&bin, "relay", "echo \"$@\"; sleep 30");

    let mut config = harness.config();
    config.jvm.java_path = java;
    config.relay.enabled = true;
    config.relay.program = relay;
    config.relay.poll_interval_ms = 20;

    let workflow = Arc::new(harness.workflow(config));
    workflow
        .create(&CreateRequest::new(Variant::Vanilla, VERSION), None)
        .await
        .unwrap();

    let (interrupt_tx, interrupt_rx) = mpsc::channel(4);
    let session = tokio::spawn({
        let workflow = workflow.clone();
        async move { workflow.start(interrupt_rx, None, None).await }
    });

    let mut recorded = None;
    for _ in 0..100 {
        let status = workflow.status().await.unwrap();
        if let Some(endpoint) = status.stored.as_ref().and_then(|s| s.live_endpoint()) {
            recorded = Some(endpoint.clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let recorded = recorded.expect("endpoint never recorded");
    assert_eq!(recorded.to_string(), "0.tcp.ngrok.io:54321");

    interrupt_tx.send(()).await.unwrap();
    let report = tokio::time::timeout(Duration::from_secs(10), session)
        .await
        .expect("session did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(report.end, SessionEnd::Interrupted);
    assert_eq!(report.game.status, ProcessStatus::Stopped);
    assert!(report.all_stopped());

    let stored = workflow.status().await.unwrap().stored.unwrap();
    let tunnel = stored.tunnel.as_ref().unwrap();
    assert_eq!(tunnel.source, EndpointSource::Relay);
    assert!(!tunnel.valid);
    assert_eq!(stored.live_endpoint(), None);

    let log = std::fs::read_to_string(harness.root.path().join("relay.log")).unwrap();
    assert!(log.contains("tcp 25565 --region us"), "relay log: {}", log);
}

/// Swaps the jar mock for one that answers only after `delay`.
async fn serve_slow_jar(harness: &TestHarness, delay: Duration) -> httpmock::Mock<'_> {
    harness
        .server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v1/objects/{}/server.jar", VERSION));
            then.status(200).body(JAR).delay(delay);
        })
        .await
}

#[tokio::test]
async fn test_interrupt_during_download_does_not_launch() {
    let harness = TestHarness::new().await;
    let jar = harness.serve_vanilla().await;
    let marker = harness.root.path().join("launched");
    let java = fixtures::write_script(
        harness.root.path(),
        "java",
        &format!("touch {}; exit 0", marker.display()),
    );

    let mut config = harness.config();
    config.jvm.java_path = java;
    let workflow = harness.workflow(config);
    workflow
        .create(&CreateRequest::new(Variant::Vanilla, VERSION), None)
        .await
        .unwrap();

    jar.delete_async().await;
    let slow_jar = serve_slow_jar(&harness, Duration::from_secs(5)).await;
    let dir = harness.server_dir();
    std::fs::remove_file(dir.join("server.jar")).unwrap();

    let (interrupt_tx, interrupt_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = interrupt_tx.send(()).await;
    });
    let started = std::time::Instant::now();
    let err = workflow.start(interrupt_rx, None, None).await.unwrap_err();

    assert!(err.is_interrupted());
    assert!(err.is_retryable());
    assert!(started.elapsed() < Duration::from_secs(4));
    slow_jar.assert_hits_async(1).await;
    assert!(!marker.exists());
    assert!(!dir.join("server.jar").exists());
    assert!(!dir.join("server.jar.part").exists());
}

#[tokio::test]
async fn test_abandoned_create_leaves_no_partial_jar() {
    let harness = TestHarness::new().await;
    let jar = harness.serve_vanilla().await;
    jar.delete_async().await;
    serve_slow_jar(&harness, Duration::from_secs(5)).await;
    let workflow = harness.workflow(harness.config());

    let request = CreateRequest::new(Variant::Vanilla, VERSION);
    let create = workflow.create(&request, None);
    let abandoned = tokio::time::timeout(Duration::from_millis(300), create).await;
    assert!(abandoned.is_err());

    let dir = harness.server_dir();
    assert!(!dir.join("server.jar").exists());
    assert!(!dir.join("server.jar.part").exists());
}

#[tokio::test]
async fn test_start_reports_crashed_game() {
    let harness = TestHarness::new().await;
    harness.serve_vanilla().await;
    let java = fixtures::write_script(harness.root.path(), "java", "exit 3");

    let mut config = harness.config();
    config.jvm.java_path = java;
    let workflow = harness.workflow(config);
    workflow
        .create(&CreateRequest::new(Variant::Vanilla, VERSION), None)
        .await
        .unwrap();

    let (_interrupt_tx, interrupt_rx) = mpsc::channel(1);
    let report = workflow.start(interrupt_rx, None, None).await.unwrap();

    assert_eq!(report.end, SessionEnd::GameExited);
    assert_eq!(report.game.status, ProcessStatus::Failed);
    assert_eq!(report.game.exit_code, Some(3));
    assert!(report.tunnel.is_none());
}

#[tokio::test]
async fn test_manual_endpoint_and_show_command() {
    let harness = TestHarness::new().await;
    harness.serve_vanilla().await;
    let workflow = harness.workflow(harness.config());
    workflow
        .create(&CreateRequest::new(Variant::Vanilla, VERSION), None)
        .await
        .unwrap();

    let command = workflow.show_command().unwrap();
    assert!(command.starts_with("cd "), "command: {}", command);
    assert!(command.ends_with("java -Xms1G -Xmx2G -jar server.jar nogui"));

    let endpoint = workflow
        .set_manual_endpoint("tcp://2.tcp.eu.ngrok.io:14022")
        .unwrap();
    assert_eq!(endpoint.to_string(), "2.tcp.eu.ngrok.io:14022");

    let stored = workflow.status().await.unwrap().stored.unwrap();
    let tunnel = stored.tunnel.as_ref().unwrap();
    assert_eq!(tunnel.source, EndpointSource::Manual);
    assert!(tunnel.valid);

    let err = workflow.set_manual_endpoint("no-port-here").unwrap_err();
    assert_eq!(err.step, Step::Tunnel);
    assert_eq!(err.recovery, Recovery::ChangeInput);
}

#[tokio::test]
async fn test_delete_removes_server_state_and_log() {
    let harness = TestHarness::new().await;
    harness.serve_vanilla().await;
    let workflow = harness.workflow(harness.config());
    workflow
        .create(&CreateRequest::new(Variant::Vanilla, VERSION), None)
        .await
        .unwrap();
    std::fs::write(harness.root.path().join("relay.log"), "old session\n").unwrap();

    let report = workflow.delete().await.unwrap();
    assert_eq!(report.removed.len(), 3);
    assert!(!harness.server_dir().exists());
    assert!(!harness.root.path().join("server_config.json").exists());
    assert!(!harness.root.path().join("relay.log").exists());

    assert!(workflow.status().await.unwrap().stored.is_none());
    assert!(workflow.delete().await.unwrap().removed.is_empty());
}
