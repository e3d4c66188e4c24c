use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::config::ShutdownConfig;
use super::managed::ManagedChild;
use super::types::{LaunchSpec, ManagedProcess, ProcessStatus, SessionEnd, SessionReport};
use super::ProcessError;
use crate::tunnel::{StopMode, TunnelHandle, TunnelState, TunnelSupervisor};

/// Called on every tunnel state change, including the final `Stopped`.
pub type TunnelCallback = Arc<dyn Fn(&TunnelState) + Send + Sync>;

/// Runs a game server session with an optional relay tunnel alongside.
pub struct ProcessOrchestrator {
    shutdown: ShutdownConfig,
    tunnel_callback: Option<TunnelCallback>,
}

impl ProcessOrchestrator {
    pub fn new(shutdown: ShutdownConfig) -> Self {
        Self {
            shutdown,
            tunnel_callback: None,
        }
    }

    pub fn with_tunnel_callback(mut self, callback: TunnelCallback) -> Self {
        self.tunnel_callback = Some(callback);
        self
    }

    /// Spawns one process.
    pub fn start(&self, spec: &LaunchSpec) -> Result<ManagedChild, ProcessError> {
        ManagedChild::spawn(spec)
    }

    /// Runs until the game exits or an interrupt arrives.
    ///
    /// The first interrupt stops the game gracefully; a second one during
    /// the grace period kills it. Lines received on `console` are forwarded
    /// to the game's stdin. The tunnel is torn down on every path out of
    /// this function, including a failed game launch.
    pub async fn run(
        &self,
        game_spec: &LaunchSpec,
        tunnel: Option<TunnelSupervisor>,
        mut interrupts: mpsc::Receiver<()>,
        mut console: Option<mpsc::Receiver<String>>,
    ) -> Result<SessionReport, ProcessError> {
        let mut tunnel = match tunnel.map(TunnelSupervisor::start) {
            Some(Ok(handle)) => Some(handle),
            Some(Err(e)) => {
                warn!("Continuing without a public endpoint: {}", e);
                None
            }
            None => None,
        };
        let mut tunnel_rx = tunnel.as_ref().map(TunnelHandle::subscribe);

        let mut game = match self.start(game_spec) {
            Ok(child) => child,
            Err(e) => {
                if let Some(handle) = tunnel.take() {
                    let (_, state) = handle.stop().await;
                    self.notify(&state);
                }
                return Err(e);
            }
        };

        let mut interrupts_open = true;
        let mut end = loop {
            tokio::select! {
                _ = game.wait() => break SessionEnd::GameExited,
                signal = interrupts.recv(), if interrupts_open => match signal {
                    Some(()) => {
                        info!("Interrupt received, stopping game server (interrupt again to force)");
                        break SessionEnd::Interrupted;
                    }
                    None => interrupts_open = false,
                },
                state = next_state(&mut tunnel_rx) => match state {
                    Some(state) => self.on_tunnel_state(&state),
                    None => tunnel_rx = None,
                },
                line = next_line(&mut console) => match line {
                    Some(line) => {
                        if let Err(e) = game.send_line(&line).await {
                            warn!("Could not forward console input: {}", e);
                        }
                    }
                    None => console = None,
                },
            }
        };

        let game_record = match end {
            SessionEnd::GameExited => {
                let record = game.record();
                if record.status == ProcessStatus::Failed {
                    warn!("Game server exited abnormally; not restarting");
                }
                record
            }
            _ => {
                let (record, forced) = self
                    .shutdown_game(&mut game, &mut interrupts, interrupts_open)
                    .await;
                if forced {
                    end = SessionEnd::Forced;
                }
                record
            }
        };

        let (tunnel_record, tunnel_state) = match tunnel.take() {
            Some(handle) => {
                let forced = end == SessionEnd::Forced;
                let (record, state) =
                    stop_tunnel(handle, forced, &mut interrupts, interrupts_open).await;
                self.notify(&state);
                (Some(record), Some(state))
            }
            None => (None, None),
        };

        let report = SessionReport {
            end,
            game: game_record,
            tunnel: tunnel_record,
            tunnel_state,
        };
        info!("Session ended: {:?}", report.end);
        Ok(report)
    }

    async fn shutdown_game(
        &self,
        game: &mut ManagedChild,
        interrupts: &mut mpsc::Receiver<()>,
        interrupts_open: bool,
    ) -> (ManagedProcess, bool) {
        if game.has_exited() {
            return (game.record(), false);
        }

        let grace = Duration::from_secs(self.shutdown.grace_period_secs);
        if !game.request_stop(Some(&self.shutdown.stop_command)).await {
            return (game.kill().await, true);
        }

        let forced = tokio::select! {
            waited = tokio::time::timeout(grace, game.wait()) => {
                if waited.is_err() {
                    warn!("Game server did not stop within {:?}, killing", grace);
                }
                waited.is_err()
            }
            _ = second_interrupt(interrupts, interrupts_open) => {
                warn!("Second interrupt, killing game server");
                true
            }
        };

        if forced {
            (game.kill().await, true)
        } else {
            (game.record(), false)
        }
    }

    fn on_tunnel_state(&self, state: &TunnelState) {
        match state {
            TunnelState::EndpointAssigned { endpoint, .. } => {
                info!("Players can connect at {}", endpoint);
            }
            TunnelState::TimedOut { .. } => {
                warn!("No public endpoint yet; check the relay log or dashboard");
            }
            TunnelState::Stopped { .. } => {
                warn!("Relay tunnel stopped; the server is only reachable locally");
            }
            _ => {}
        }
        self.notify(state);
    }

    fn notify(&self, state: &TunnelState) {
        if let Some(callback) = &self.tunnel_callback {
            callback(state);
        }
    }
}

async fn next_state(rx: &mut Option<watch::Receiver<TunnelState>>) -> Option<TunnelState> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

async fn next_line(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Stops the relay gracefully unless the game was already force-killed.
/// A further interrupt while the relay winds down escalates to a kill.
async fn stop_tunnel(
    handle: TunnelHandle,
    forced: bool,
    interrupts: &mut mpsc::Receiver<()>,
    interrupts_open: bool,
) -> (ManagedProcess, TunnelState) {
    if forced {
        return handle.kill().await;
    }

    let stopper = handle.stopper();
    let stop = handle.stop();
    tokio::pin!(stop);
    tokio::select! {
        result = &mut stop => result,
        _ = second_interrupt(interrupts, interrupts_open) => {
            warn!("Second interrupt, killing relay client");
            let _ = stopper.try_send(StopMode::Force);
            stop.await
        }
    }
}

async fn second_interrupt(interrupts: &mut mpsc::Receiver<()>, open: bool) {
    if open && interrupts.recv().await.is_some() {
        return;
    }
    std::future::pending::<()>().await
}
