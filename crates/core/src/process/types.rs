use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use super::config::JvmConfig;
use super::ProcessError;
use crate::server_files::ServerLayout;
use crate::profile::Variant;
use crate::tunnel::TunnelState;

/// Console line a Minecraft server prints once it accepts players.
pub const GAME_READY_MARKER: &str = "Done (";

/// Which role a child process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    GameServer,
    Tunnel,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::GameServer => f.write_str("game server"),
            ProcessKind::Tunnel => f.write_str("relay tunnel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Stopped | ProcessStatus::Failed)
    }
}

/// Snapshot of one supervised child.
///
/// A new id is minted per spawn; a restart is a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedProcess {
    pub id: Uuid,
    pub kind: ProcessKind,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

impl ManagedProcess {
    pub(crate) fn starting(kind: ProcessKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            pid: None,
            started_at: Utc::now(),
            status: ProcessStatus::Starting,
            exit_code: None,
            message: None,
        }
    }
}

/// JVM heap size such as `512M` or `2G`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSize {
    bytes: u64,
}

impl HeapSize {
    /// Accepts a plain byte count or a number with a K, M or G suffix.
    pub fn parse(value: &str) -> Result<Self, ProcessError> {
        let trimmed = value.trim();
        let invalid = || ProcessError::InvalidHeapSize(value.to_string());

        let (digits, multiplier) = match trimmed.chars().last() {
            Some('k' | 'K') => (&trimmed[..trimmed.len() - 1], 1024u64),
            Some('m' | 'M') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
            Some('g' | 'G') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
            Some(c) if c.is_ascii_digit() => (trimmed, 1),
            _ => return Err(invalid()),
        };

        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }
        let bytes = amount.checked_mul(multiplier).ok_or_else(invalid)?;
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Where a child's stdout and stderr go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Echo to the operator's terminal, watching for the ready marker.
    Console,
    /// Append to a log file.
    File(PathBuf),
    Null,
}

/// Everything needed to spawn a child.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub kind: ProcessKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputSink,
    /// Keep stdin open for console commands.
    pub stdin_piped: bool,
    /// Output line that moves the process from Starting to Running.
    pub ready_marker: Option<String>,
}

impl LaunchSpec {
    pub fn new(kind: ProcessKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            output: OutputSink::Null,
            stdin_piped: false,
            ready_marker: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn output(mut self, sink: OutputSink) -> Self {
        self.output = sink;
        self
    }

    pub fn with_console(mut self) -> Self {
        self.stdin_piped = true;
        self
    }

    pub fn ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.ready_marker = Some(marker.into());
        self
    }

    /// `java -Xms.. -Xmx.. [extra] -jar <jar> nogui`, run inside the server directory.
    pub fn game_server(
        layout: &ServerLayout,
        variant: Variant,
        jvm: &JvmConfig,
    ) -> Result<Self, ProcessError> {
        HeapSize::parse(&jvm.min_heap)?;
        HeapSize::parse(&jvm.max_heap)?;

        let spec = Self::new(ProcessKind::GameServer, &jvm.java_path)
            .args([format!("-Xms{}", jvm.min_heap.trim()), format!("-Xmx{}", jvm.max_heap.trim())])
            .args(jvm.extra_args.iter().cloned())
            .args(["-jar".to_string(), variant.jar_file_name().to_string(), "nogui".to_string()])
            .working_dir(layout.dir())
            .output(OutputSink::Console)
            .with_console()
            .ready_marker(GAME_READY_MARKER);
        Ok(spec)
    }

    /// Shell-ready command line, as an operator would type it.
    pub fn display_command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 3);
        if let Some(dir) = &self.working_dir {
            parts.push(format!("cd {} &&", shell_quote(&dir.to_string_lossy())));
        }
        parts.push(shell_quote(&self.program.to_string_lossy()));
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The game server exited on its own.
    GameExited,
    /// Operator interrupt, graceful stop.
    Interrupted,
    /// Operator interrupt escalated, or grace period exceeded.
    Forced,
}

/// Outcome of a [`ProcessOrchestrator`](super::ProcessOrchestrator) session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub game: ManagedProcess,
    pub tunnel: Option<ManagedProcess>,
    pub tunnel_state: Option<TunnelState>,
}

impl SessionReport {
    /// True once nothing from this session is still running.
    pub fn all_stopped(&self) -> bool {
        self.game.status.is_terminal()
            && self
                .tunnel
                .as_ref()
                .map(|t| t.status.is_terminal())
                .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_size_parse() {
        assert_eq!(HeapSize::parse("1G").unwrap().bytes(), 1024 * 1024 * 1024);
        assert_eq!(HeapSize::parse("512m").unwrap().bytes(), 512 * 1024 * 1024);
        assert_eq!(HeapSize::parse("1024K").unwrap().bytes(), 1024 * 1024);
        assert_eq!(HeapSize::parse("4096").unwrap().bytes(), 4096);
        assert_eq!(
            HeapSize::parse("2048M").unwrap(),
            HeapSize::parse("2G").unwrap()
        );
    }

    #[test]
    fn test_heap_size_rejects_garbage() {
        for bad in ["", "G", "0G", "1.5G", "lots", "2T", "-1G"] {
            assert!(HeapSize::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_game_server_command() {
        let layout = ServerLayout::new("/srv/mc");
        let spec = LaunchSpec::game_server(&layout, Variant::Paper, &JvmConfig::default()).unwrap();

        assert_eq!(spec.kind, ProcessKind::GameServer);
        assert_eq!(spec.program, PathBuf::from("java"));
        assert_eq!(spec.args, vec!["-Xms1G", "-Xmx2G", "-jar", "paper.jar", "nogui"]);
        assert_eq!(spec.working_dir, Some(PathBuf::from("/srv/mc")));
        assert!(spec.stdin_piped);
        assert_eq!(spec.ready_marker.as_deref(), Some(GAME_READY_MARKER));
        assert_eq!(
            spec.display_command(),
            "cd /srv/mc && java -Xms1G -Xmx2G -jar paper.jar nogui"
        );
    }

    #[test]
    fn test_game_server_extra_args_before_jar() {
        let jvm = JvmConfig {
            extra_args: vec!["-XX:+UseG1GC".to_string()],
            ..Default::default()
        };
        let spec = LaunchSpec::game_server(&ServerLayout::new("mc"), Variant::Vanilla, &jvm).unwrap();
        assert_eq!(spec.args[2], "-XX:+UseG1GC");
        assert_eq!(spec.args[3], "-jar");
    }

    #[test]
    fn test_game_server_rejects_bad_heap() {
        let jvm = JvmConfig {
            max_heap: "huge".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            LaunchSpec::game_server(&ServerLayout::new("mc"), Variant::Vanilla, &jvm),
            Err(ProcessError::InvalidHeapSize(_))
        ));
    }

    #[test]
    fn test_display_command_quotes() {
        let spec = LaunchSpec::new(ProcessKind::Tunnel, "/opt/my relay/ngrok").args(["tcp", "it's"]);
        assert_eq!(
            spec.display_command(),
            r"'/opt/my relay/ngrok' tcp 'it'\''s'"
        );
    }

    #[test]
    fn test_report_all_stopped() {
        let mut game = ManagedProcess::starting(ProcessKind::GameServer);
        game.status = ProcessStatus::Stopped;
        let mut tunnel = ManagedProcess::starting(ProcessKind::Tunnel);
        tunnel.status = ProcessStatus::Running;

        let mut report = SessionReport {
            end: SessionEnd::GameExited,
            game,
            tunnel: Some(tunnel),
            tunnel_state: None,
        };
        assert!(!report.all_stopped());
        report.tunnel.as_mut().unwrap().status = ProcessStatus::Failed;
        assert!(report.all_stopped());
    }
}
