use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::RelayConfig;
use super::status::RelayStatusSource;
use super::types::{PollOutcome, Region, TunnelEndpoint, TunnelState};
use super::TunnelError;
use crate::process::{LaunchSpec, ManagedChild, ManagedProcess, OutputSink, ProcessKind, ProcessStatus};

/// Polls `source` until it lists a usable tunnel or the budget runs out.
///
/// The first poll happens immediately. Unreachable status APIs count as
/// "not ready yet". `on_attempt` is called with the attempt number before
/// each poll. The whole loop, slow status responses included, finishes
/// within `interval * max_attempts`.
pub async fn poll_for_endpoint(
    source: &dyn RelayStatusSource,
    interval: Duration,
    max_attempts: u32,
    region: Region,
    mut on_attempt: impl FnMut(u32),
) -> PollOutcome {
    let deadline = Instant::now() + interval * max_attempts;

    for attempt in 1..=max_attempts {
        on_attempt(attempt);

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, source.fetch_tunnels()).await {
            Ok(Ok(tunnels)) => match tunnels.first() {
                Some(first) => match TunnelEndpoint::from_public_url(&first.public_url, region) {
                    Ok(endpoint) => {
                        return PollOutcome::Assigned {
                            endpoint,
                            attempts: attempt,
                        }
                    }
                    Err(e) => warn!("Ignoring tunnel entry: {}", e),
                },
                None => debug!("Attempt {}/{}: no tunnels yet", attempt, max_attempts),
            },
            Ok(Err(e)) => debug!("Attempt {}/{}: {}", attempt, max_attempts, e),
            Err(_) => {
                debug!(
                    "Attempt {}/{}: status API did not answer before the deadline",
                    attempt, max_attempts
                );
                return PollOutcome::TimedOut { attempts: attempt };
            }
        }

        if attempt < max_attempts {
            let next = Instant::now() + interval;
            if next >= deadline {
                return PollOutcome::TimedOut { attempts: attempt };
            }
            tokio::time::sleep_until(next).await;
        }
    }

    PollOutcome::TimedOut {
        attempts: max_attempts,
    }
}

/// Launches the relay client and tracks its endpoint.
pub struct TunnelSupervisor {
    config: RelayConfig,
    program: PathBuf,
    source: Arc<dyn RelayStatusSource>,
    log_path: PathBuf,
    local_port: u16,
    state_tx: watch::Sender<TunnelState>,
}

impl TunnelSupervisor {
    pub fn new(
        config: RelayConfig,
        source: Arc<dyn RelayStatusSource>,
        log_path: impl Into<PathBuf>,
        local_port: u16,
    ) -> Self {
        let (state_tx, _) = watch::channel(TunnelState::Idle);
        Self {
            program: config.program.clone(),
            config,
            source,
            log_path: log_path.into(),
            local_port,
            state_tx,
        }
    }

    /// Overrides the relay executable, e.g. with a path resolved against the install root.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn state(&self) -> TunnelState {
        self.state_tx.borrow().clone()
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec::new(ProcessKind::Tunnel, &self.program)
            .args(self.config.render_args(self.local_port))
            .output(OutputSink::File(self.log_path.clone()))
    }

    /// Spawns the relay and starts polling in the background.
    pub fn start(self) -> Result<TunnelHandle, TunnelError> {
        self.state_tx.send_replace(TunnelState::Launching);
        info!(
            "Launching relay client for port {} in region {} (log: {})",
            self.local_port,
            self.config.region,
            self.log_path.display()
        );

        let child = match ManagedChild::spawn(&self.launch_spec()) {
            Ok(child) => child,
            Err(e) => {
                self.state_tx.send_replace(TunnelState::Stopped {
                    stale_endpoint: None,
                });
                return Err(TunnelError::Launch(e));
            }
        };

        let state_rx = self.state_tx.subscribe();
        let (process_tx, process_rx) = watch::channel(child.record());
        let (stop_tx, stop_rx) = mpsc::channel(2);

        let task = tokio::spawn(supervise(
            child,
            self.source,
            Duration::from_millis(self.config.poll_interval_ms),
            self.config.max_attempts,
            self.config.region,
            Duration::from_millis(self.config.stop_grace_ms),
            self.state_tx,
            process_tx,
            stop_rx,
        ));

        Ok(TunnelHandle {
            state_rx,
            process_rx,
            stop_tx,
            task: Some(task),
        })
    }
}

/// How the relay should be taken down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// SIGTERM, then kill once the grace period runs out.
    Graceful,
    /// Kill right away.
    Force,
}

enum Phase {
    Polled(PollOutcome),
    Exited,
    StopRequested(StopMode),
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    mut child: ManagedChild,
    source: Arc<dyn RelayStatusSource>,
    interval: Duration,
    max_attempts: u32,
    region: Region,
    stop_grace: Duration,
    state_tx: watch::Sender<TunnelState>,
    process_tx: watch::Sender<ManagedProcess>,
    mut stop_rx: mpsc::Receiver<StopMode>,
) -> ManagedProcess {
    state_tx.send_replace(TunnelState::AwaitingEndpoint { attempts: 0 });

    let phase = tokio::select! {
        outcome = poll_for_endpoint(source.as_ref(), interval, max_attempts, region, |attempts| {
            state_tx.send_replace(TunnelState::AwaitingEndpoint { attempts });
        }) => Phase::Polled(outcome),
        _ = child.wait() => Phase::Exited,
        mode = stop_rx.recv() => Phase::StopRequested(mode.unwrap_or(StopMode::Force)),
    };

    let mut published: Option<TunnelEndpoint> = None;
    let mut stop_mode = None;
    match phase {
        Phase::Polled(PollOutcome::Assigned { endpoint, attempts }) => {
            info!("Public endpoint assigned: {} (after {} attempts)", endpoint, attempts);
            published = Some(endpoint.clone());
            state_tx.send_replace(TunnelState::EndpointAssigned { endpoint, attempts });
        }
        Phase::Polled(PollOutcome::TimedOut { attempts }) => {
            warn!(
                "{}; the game server keeps running without a public endpoint",
                TunnelError::Timeout { attempts }
            );
            state_tx.send_replace(TunnelState::TimedOut { attempts });
        }
        Phase::Exited => {
            warn!("Relay client exited before an endpoint was assigned");
        }
        Phase::StopRequested(mode) => stop_mode = Some(mode),
    }

    if stop_mode.is_none() && !child.has_exited() {
        process_tx.send_replace(child.record());
        tokio::select! {
            _ = child.wait() => {
                warn!("Relay client exited; public endpoint is no longer valid");
            }
            mode = stop_rx.recv() => stop_mode = Some(mode.unwrap_or(StopMode::Force)),
        }
    }

    let record = match stop_mode {
        Some(StopMode::Graceful) => shut_down_relay(&mut child, stop_grace, &mut stop_rx).await,
        _ => child.kill().await,
    };
    debug!("Relay client finished with status {:?}", record.status);
    process_tx.send_replace(record.clone());
    state_tx.send_replace(TunnelState::Stopped {
        stale_endpoint: published,
    });
    record
}

/// SIGTERM, then kill after `grace` or on a follow-up `Force` request.
async fn shut_down_relay(
    child: &mut ManagedChild,
    grace: Duration,
    stop_rx: &mut mpsc::Receiver<StopMode>,
) -> ManagedProcess {
    if child.has_exited() || !child.request_stop(None).await {
        return child.kill().await;
    }

    let forced = tokio::select! {
        waited = tokio::time::timeout(grace, child.wait()) => {
            if waited.is_err() {
                warn!("Relay client did not exit within {:?}, killing", grace);
            }
            waited.is_err()
        }
        _ = force_requested(stop_rx) => true,
    };

    if forced {
        child.kill().await
    } else {
        child.record()
    }
}

async fn force_requested(stop_rx: &mut mpsc::Receiver<StopMode>) {
    while let Some(mode) = stop_rx.recv().await {
        if mode == StopMode::Force {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Handle to a running relay supervisor.
///
/// Dropping the handle aborts supervision, which kills the relay.
pub struct TunnelHandle {
    state_rx: watch::Receiver<TunnelState>,
    process_rx: watch::Receiver<ManagedProcess>,
    stop_tx: mpsc::Sender<StopMode>,
    task: Option<JoinHandle<ManagedProcess>>,
}

impl TunnelHandle {
    pub fn state(&self) -> TunnelState {
        self.state_rx.borrow().clone()
    }

    /// The endpoint while it is valid.
    pub fn endpoint(&self) -> Option<TunnelEndpoint> {
        self.state_rx.borrow().endpoint().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<TunnelState> {
        self.state_rx.clone()
    }

    pub fn process(&self) -> ManagedProcess {
        self.process_rx.borrow().clone()
    }

    /// Waits until polling settles and returns the endpoint, if any.
    pub async fn wait_for_endpoint(&mut self) -> Result<TunnelEndpoint, TunnelError> {
        let settled = self
            .state_rx
            .wait_for(|state| state.is_settled())
            .await
            .map(|state| state.clone())
            .map_err(|_| TunnelError::NotRunning)?;

        match settled {
            TunnelState::EndpointAssigned { endpoint, .. } => Ok(endpoint),
            TunnelState::TimedOut { attempts } => Err(TunnelError::Timeout { attempts }),
            _ => Err(TunnelError::NotRunning),
        }
    }

    /// Sender for stop requests, usable while [`stop`](Self::stop) is in
    /// progress to escalate with [`StopMode::Force`].
    pub fn stopper(&self) -> mpsc::Sender<StopMode> {
        self.stop_tx.clone()
    }

    /// Asks the relay to exit, kills it after the grace period, and waits.
    pub async fn stop(self) -> (ManagedProcess, TunnelState) {
        self.shut_down(StopMode::Graceful).await
    }

    /// Kills the relay and waits.
    pub async fn kill(self) -> (ManagedProcess, TunnelState) {
        self.shut_down(StopMode::Force).await
    }

    async fn shut_down(mut self, mode: StopMode) -> (ManagedProcess, TunnelState) {
        let _ = self.stop_tx.try_send(mode);

        let record = match self.task.take() {
            Some(task) => match task.await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Relay supervisor task failed: {}", e);
                    let mut record = self.process();
                    record.status = ProcessStatus::Failed;
                    record.message = Some(e.to_string());
                    record
                }
            },
            None => self.process(),
        };

        (record, self.state())
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRelayStatus;
    use crate::tunnel::RelayTunnel;

    #[tokio::test]
    async fn test_poll_assigns_on_third_attempt() {
        let source = MockRelayStatus::new();
        source.push_empty().await;
        source.push_unavailable().await;
        source
            .push_tunnels(vec![RelayTunnel::new("tcp://0.tcp.ngrok.io:54321")])
            .await;

        let mut seen = Vec::new();
        let outcome = poll_for_endpoint(&source, Duration::from_millis(5), 10, Region::Us, |n| {
            seen.push(n)
        })
        .await;

        match outcome {
            PollOutcome::Assigned { endpoint, attempts } => {
                assert_eq!(endpoint.host, "0.tcp.ngrok.io");
                assert_eq!(endpoint.port, 54321);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(source.poll_count().await, 3);
    }

    #[tokio::test]
    async fn test_poll_times_out_after_budget() {
        let source = MockRelayStatus::new();
        let outcome =
            poll_for_endpoint(&source, Duration::from_millis(20), 4, Region::Eu, |_| {}).await;
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 4 });
        assert_eq!(source.poll_count().await, 4);
    }

    #[tokio::test]
    async fn test_poll_takes_first_entry() {
        let source = MockRelayStatus::new();
        source
            .push_tunnels(vec![
                RelayTunnel::new("tcp://first.example:1001"),
                RelayTunnel::new("tcp://second.example:1002"),
            ])
            .await;
        let outcome =
            poll_for_endpoint(&source, Duration::from_millis(1), 3, Region::Us, |_| {}).await;
        assert!(
            matches!(outcome, PollOutcome::Assigned { endpoint, attempts: 1 } if endpoint.host == "first.example")
        );
    }

    struct StalledStatus {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl RelayStatusSource for StalledStatus {
        async fn fetch_tunnels(&self) -> Result<Vec<RelayTunnel>, TunnelError> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![RelayTunnel::new("tcp://late.example:1003")])
        }
    }

    #[tokio::test]
    async fn test_poll_deadline_covers_slow_responses() {
        let source = StalledStatus {
            delay: Duration::from_millis(200),
        };
        let started = std::time::Instant::now();
        let outcome =
            poll_for_endpoint(&source, Duration::from_millis(20), 5, Region::Us, |_| {}).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 1 });
        assert!(
            elapsed < Duration::from_millis(100) + Duration::from_millis(50),
            "polling took {:?}",
            elapsed
        );
    }

    fn sleeping_relay() -> RelayConfig {
        RelayConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "echo relay {port} {region}; sleep 30".to_string()],
            poll_interval_ms: 20,
            max_attempts: 3,
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_supervisor_publishes_endpoint_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockRelayStatus::new());
        source
            .push_tunnels(vec![RelayTunnel::new("tcp://relay.example:40000")])
            .await;

        let log = dir.path().join("relay.log");
        let supervisor =
            TunnelSupervisor::new(sleeping_relay(), source.clone(), &log, 25565);
        assert_eq!(supervisor.state(), TunnelState::Idle);

        let mut handle = supervisor.start().unwrap();
        let endpoint = handle.wait_for_endpoint().await.unwrap();
        assert_eq!(endpoint.to_string(), "relay.example:40000");
        assert_eq!(handle.endpoint(), Some(endpoint.clone()));
        assert_eq!(handle.process().status, ProcessStatus::Running);

        let (record, state) = handle.stop().await;
        assert_eq!(record.status, ProcessStatus::Stopped);
        assert_eq!(
            state,
            TunnelState::Stopped {
                stale_endpoint: Some(endpoint)
            }
        );

        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("relay 25565 us"));
    }

    #[tokio::test]
    async fn test_supervisor_timeout_keeps_relay_running() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockRelayStatus::new());
        let supervisor = TunnelSupervisor::new(
            sleeping_relay(),
            source,
            dir.path().join("relay.log"),
            25565,
        );

        let mut handle = supervisor.start().unwrap();
        let err = handle.wait_for_endpoint().await.unwrap_err();
        assert!(matches!(err, TunnelError::Timeout { attempts: 3 }));
        assert_eq!(handle.state(), TunnelState::TimedOut { attempts: 3 });
        assert_eq!(handle.process().status, ProcessStatus::Running);

        let (record, _) = handle.stop().await;
        assert!(record.status.is_terminal());
    }

    #[tokio::test]
    async fn test_supervisor_missing_relay_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            program: PathBuf::from("/nonexistent/ngrok"),
            ..RelayConfig::default()
        };
        let supervisor = TunnelSupervisor::new(
            config,
            Arc::new(MockRelayStatus::new()),
            dir.path().join("relay.log"),
            25565,
        );
        assert!(matches!(supervisor.start(), Err(TunnelError::Launch(_))));
    }

    #[tokio::test]
    async fn test_relay_crash_invalidates_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockRelayStatus::new());
        source
            .push_tunnels(vec![RelayTunnel::new("tcp://relay.example:40001")])
            .await;
        let config = RelayConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "sleep 0.3; exit 1".to_string()],
            poll_interval_ms: 5,
            max_attempts: 3,
            ..RelayConfig::default()
        };

        let handle = TunnelSupervisor::new(config, source, dir.path().join("relay.log"), 25565)
            .start()
            .unwrap();
        let mut states = handle.subscribe();
        states
            .wait_for(|s| matches!(s, TunnelState::Stopped { .. }))
            .await
            .unwrap();
        assert!(handle.endpoint().is_none());
        assert_eq!(handle.process().status, ProcessStatus::Failed);
    }

    fn trapping_relay(script: String, stop_grace_ms: u64) -> RelayConfig {
        RelayConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script],
            poll_interval_ms: 20,
            max_attempts: 2,
            stop_grace_ms,
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_stop_lets_relay_handle_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("relay-term");
        let script = format!(
            "trap 'touch {}; exit 0' TERM; while true; do sleep 0.1; done",
            marker.display()
        );
        let handle = TunnelSupervisor::new(
            trapping_relay(script, 5_000),
            Arc::new(MockRelayStatus::new()),
            dir.path().join("relay.log"),
            25565,
        )
        .start()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let (record, state) = handle.stop().await;
        assert_eq!(record.status, ProcessStatus::Stopped);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.message.is_none());
        assert!(matches!(state, TunnelState::Stopped { .. }));
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_stop_kills_relay_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let script = "trap '' TERM; while true; do sleep 0.1; done".to_string();
        let handle = TunnelSupervisor::new(
            trapping_relay(script, 200),
            Arc::new(MockRelayStatus::new()),
            dir.path().join("relay.log"),
            25565,
        )
        .start()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        let (record, _) = handle.stop().await;
        assert_eq!(record.status, ProcessStatus::Stopped);
        assert_eq!(record.message.as_deref(), Some("killed"));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_force_request_cuts_grace_short() {
        let dir = tempfile::tempdir().unwrap();
        let script = "trap '' TERM; while true; do sleep 0.1; done".to_string();
        let handle = TunnelSupervisor::new(
            trapping_relay(script, 60_000),
            Arc::new(MockRelayStatus::new()),
            dir.path().join("relay.log"),
            25565,
        )
        .start()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stopper = handle.stopper();
        let started = std::time::Instant::now();
        let stop = tokio::spawn(handle.stop());
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.send(StopMode::Force).await.unwrap();

        let (record, _) = stop.await.unwrap();
        assert_eq!(record.status, ProcessStatus::Stopped);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
