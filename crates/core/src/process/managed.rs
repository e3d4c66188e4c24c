use std::fs::OpenOptions;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::types::{LaunchSpec, ManagedProcess, OutputSink, ProcessStatus};
use super::ProcessError;

/// A spawned child plus its bookkeeping.
///
/// The underlying process is killed if this handle is dropped while it is
/// still running.
pub struct ManagedChild {
    record: ManagedProcess,
    child: Child,
    stdin: Option<ChildStdin>,
    ready_rx: Option<watch::Receiver<bool>>,
    termination_requested: bool,
    exited: bool,
}

impl ManagedChild {
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, ProcessError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).kill_on_drop(true);
        // Own process group, so a terminal Ctrl+C reaches only the
        // orchestrator and the stop sequence decides how children end.
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(if spec.stdin_piped {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        match &spec.output {
            OutputSink::Console => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputSink::File(path) => {
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| ProcessError::launch(path, e))?;
                let log_err = log.try_clone().map_err(|e| ProcessError::launch(path, e))?;
                cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
            }
            OutputSink::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let mut record = ManagedProcess::starting(spec.kind);
        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::launch(&spec.program, e))?;
        record.pid = child.id();

        let stdin = child.stdin.take();
        let ready_rx = match (&spec.output, &spec.ready_marker) {
            (OutputSink::Console, Some(marker)) => {
                let (ready_tx, ready_rx) = watch::channel(false);
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(echo_lines(
                        stdout,
                        tokio::io::stdout(),
                        Some((marker.clone(), ready_tx)),
                    ));
                }
                Some(ready_rx)
            }
            (OutputSink::Console, None) => {
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(echo_lines(stdout, tokio::io::stdout(), None));
                }
                None
            }
            _ => None,
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(echo_lines(stderr, tokio::io::stderr(), None));
        }

        if ready_rx.is_none() {
            record.status = ProcessStatus::Running;
        }

        info!(
            "Started {} (pid {:?}): {}",
            spec.kind,
            record.pid,
            spec.display_command()
        );

        Ok(Self {
            record,
            child,
            stdin,
            ready_rx,
            termination_requested: false,
            exited: false,
        })
    }

    /// Current snapshot. Status reflects readiness until the child exits.
    pub fn record(&self) -> ManagedProcess {
        let mut record = self.record.clone();
        if !self.exited {
            let ready = self
                .ready_rx
                .as_ref()
                .map(|rx| *rx.borrow())
                .unwrap_or(true);
            record.status = if ready {
                ProcessStatus::Running
            } else {
                ProcessStatus::Starting
            };
        }
        record
    }

    pub fn pid(&self) -> Option<u32> {
        self.record.pid
    }

    /// Resolves once the ready marker has been seen. Returns false if the
    /// child closed its output first.
    pub async fn wait_ready(&mut self) -> bool {
        match self.ready_rx.as_mut() {
            Some(rx) => rx.wait_for(|ready| *ready).await.is_ok(),
            None => !self.exited,
        }
    }

    /// Waits for exit. Cancel safe.
    pub async fn wait(&mut self) -> ManagedProcess {
        if self.exited {
            return self.record();
        }
        let result = self.child.wait().await;
        self.finish(result)
    }

    /// Non-blocking exit check.
    pub fn has_exited(&mut self) -> bool {
        if self.exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.finish(Ok(status));
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Could not query {} status: {}", self.record.kind, e);
                false
            }
        }
    }

    /// Writes one console line to the child's stdin.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ProcessError> {
        let stdin = self.stdin.as_mut().ok_or(ProcessError::ConsoleUnavailable)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Asks the child to exit: the stop command on its console when there is
    /// one, SIGTERM to its process group otherwise. Returns whether a request
    /// was delivered.
    pub async fn request_stop(&mut self, stop_command: Option<&str>) -> bool {
        self.termination_requested = true;
        if self.exited {
            return false;
        }
        if let Some(command) = stop_command.filter(|_| self.stdin.is_some()) {
            match self.send_line(command).await {
                Ok(()) => {
                    debug!("Sent '{}' to {}", command, self.record.kind);
                    return true;
                }
                Err(e) => warn!("Could not send stop command to {}: {}", self.record.kind, e),
            }
        }
        self.signal_terminate()
    }

    /// Sends SIGTERM to the child's process group.
    fn signal_terminate(&mut self) -> bool {
        self.termination_requested = true;
        if self.exited {
            return false;
        }
        #[cfg(unix)]
        if let Some(pid) = self.record.pid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => {
                    debug!("Sent SIGTERM to {} (pid {})", self.record.kind, pid);
                    return true;
                }
                Err(e) => warn!("Could not signal {}: {}", self.record.kind, e),
            }
        }
        false
    }

    /// Kills the child and reaps it.
    pub async fn kill(&mut self) -> ManagedProcess {
        if self.exited {
            return self.record();
        }
        self.termination_requested = true;
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill {}: {}", self.record.kind, e);
        }
        let result = self.child.wait().await;
        let mut record = self.finish(result);
        if record.message.is_none() {
            record.message = Some("killed".to_string());
            self.record.message = record.message.clone();
        }
        record
    }

    /// Stop request, then kill once the grace period runs out.
    pub async fn terminate(&mut self, stop_command: Option<&str>, grace: Duration) -> ManagedProcess {
        if self.has_exited() {
            return self.record();
        }
        if self.request_stop(stop_command).await {
            if let Ok(record) = tokio::time::timeout(grace, self.wait()).await {
                return record;
            }
            warn!(
                "{} did not stop within {:?}, killing",
                self.record.kind, grace
            );
        }
        self.kill().await
    }

    fn finish(&mut self, result: std::io::Result<std::process::ExitStatus>) -> ManagedProcess {
        self.exited = true;
        self.stdin = None;

        match result {
            Ok(status) => {
                self.record.exit_code = status.code();
                if status.success() || self.termination_requested {
                    self.record.status = ProcessStatus::Stopped;
                    info!("{} stopped ({})", self.record.kind, status);
                } else {
                    self.record.status = ProcessStatus::Failed;
                    self.record.message = Some(format!("exited abnormally: {}", status));
                    warn!("{} exited abnormally: {}", self.record.kind, status);
                }
            }
            Err(e) => {
                self.record.status = ProcessStatus::Failed;
                self.record.message = Some(format!("wait failed: {}", e));
                warn!("Lost track of {}: {}", self.record.kind, e);
            }
        }
        self.record.clone()
    }
}

async fn echo_lines<R, W>(reader: R, mut writer: W, mut ready: Option<(String, watch::Sender<bool>)>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some((marker, tx)) = &ready {
                    if line.contains(marker.as_str()) {
                        tx.send_replace(true);
                        info!("Game server is ready");
                        ready = None;
                    }
                }
                let _ = writer.write_all(line.as_bytes()).await;
                let _ = writer.write_all(b"\n").await;
                let _ = writer.flush().await;
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Output stream closed: {}", e);
                break;
            }
        }
    }
}
