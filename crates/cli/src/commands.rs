use anyhow::{bail, Context, Result};
use craftgate_core::workflow::{DeleteReport, StatusReport};
use craftgate_core::{
    load_config_or_default, Config, CreateRequest, FetchProgress, ProcessStatus, Region,
    SessionEnd, SessionReport, Variant, Workflow,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{Cli, Command, CreateArgs, StartArgs, TunnelCommand};

/// Exit code after Ctrl+C, as shells report SIGINT.
const INTERRUPTED: i32 = 130;

/// Runs one command and returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    let config = load_config_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Create(args) => create(config, args).await,
        Command::Start(args) => start(config, args).await,
        Command::Status => status(config).await,
        Command::ShowCommand => {
            println!("{}", Workflow::new(config)?.show_command()?);
            Ok(0)
        }
        Command::Tunnel(cmd) => tunnel(config, cmd).await,
        Command::Delete(args) => {
            if !args.yes {
                bail!("refusing to delete without --yes");
            }
            let report = Workflow::new(config)?.delete().await?;
            print_deleted(&report);
            Ok(0)
        }
        Command::Versions(args) => versions(config, args.remote).await,
    }
}

async fn create(config: Config, args: CreateArgs) -> Result<i32> {
    let workflow = Workflow::new(config)?;
    let request = CreateRequest::new(args.variant, args.version)
        .pinned_build(args.build)
        .force_download(args.force);

    let (progress, printer) = progress_printer();
    let outcome = tokio::select! {
        outcome = workflow.create(&request, Some(progress)) => outcome,
        _ = tokio::signal::ctrl_c() => {
            printer.abort();
            warn!("Interrupted; partial downloads were discarded");
            return Ok(INTERRUPTED);
        }
    };
    let _ = printer.await;
    let outcome = outcome?;

    if let Some(fetch) = &outcome.fetch {
        if fetch.reused {
            println!("Kept existing {}", fetch.path.display());
        } else {
            println!(
                "Downloaded {} ({} bytes)",
                fetch.path.display(),
                fetch.bytes_written
            );
        }
    }
    if let Some(pointer) = &outcome.manual_step {
        println!(
            "{} has no automatic download. Get the installer from:\n  {}\nand place the server jar at {}",
            outcome.profile.variant(),
            pointer,
            workflow
                .layout()
                .jar_path(outcome.profile.variant())
                .display()
        );
    }
    if !outcome.provision.missing_optional.is_empty() {
        println!(
            "Optional components unavailable: {}",
            outcome.provision.missing_optional.join(", ")
        );
    }
    println!(
        "Created {} {} server in {}",
        outcome.profile.variant(),
        outcome.profile.game_version(),
        outcome.server_dir.display()
    );
    Ok(0)
}

async fn start(mut config: Config, args: StartArgs) -> Result<i32> {
    if args.no_tunnel {
        config.relay.enabled = false;
    }
    if let Some(region) = args.region {
        config.relay.region = region;
    }
    let workflow = Workflow::new(config)?;

    let (interrupt_tx, interrupt_rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(()).await.is_err() {
                break;
            }
            info!("Stopping (press Ctrl+C again to force)");
        }
    });

    let (console_tx, console_rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if console_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let (progress, printer) = progress_printer();
    let report = workflow
        .start(interrupt_rx, Some(console_rx), Some(progress))
        .await;
    let _ = printer.await;
    let report = match report {
        Err(e) if e.is_interrupted() => {
            warn!("{}", e);
            return Ok(INTERRUPTED);
        }
        other => other?,
    };

    print_session(&report);
    Ok(match report.game.status {
        ProcessStatus::Failed => report.game.exit_code.filter(|c| *c != 0).unwrap_or(1),
        _ => 0,
    })
}

async fn status(config: Config) -> Result<i32> {
    let report = Workflow::new(config)?.status().await?;
    print_status(&report);
    Ok(0)
}

async fn tunnel(mut config: Config, cmd: TunnelCommand) -> Result<i32> {
    match cmd {
        TunnelCommand::Set { address, region } => {
            if let Some(region) = region {
                config.relay.region = region;
            }
            let endpoint = Workflow::new(config)?.set_manual_endpoint(&address)?;
            println!("Saved {} ({})", endpoint, endpoint.region.location());
        }
        TunnelCommand::Show => {
            let report = Workflow::new(config)?.status().await?;
            match report.stored.as_ref().and_then(|s| s.tunnel.as_ref()) {
                Some(t) if t.valid => println!("{}", t.endpoint),
                Some(t) => println!("{} (stale, start the server for a new one)", t.endpoint),
                None => println!("No endpoint recorded"),
            }
        }
        TunnelCommand::Regions => {
            for region in Region::ALL {
                println!("{:<4} {}", region.as_str(), region.location());
            }
        }
    }
    Ok(0)
}

async fn versions(config: Config, remote: bool) -> Result<i32> {
    let workflow = Workflow::new(config)?;

    println!("Variants:");
    for variant in Variant::ALL {
        let note = if variant.requires_manual_install() {
            " (manual install)"
        } else {
            ""
        };
        println!("  {:<8} {}{}", variant.as_str(), variant.description(), note);
    }

    let versions = workflow.versions(remote).await?;
    println!("Versions:");
    for version in versions {
        println!("  {}", version);
    }
    Ok(0)
}

/// Logs download progress in 10% steps until the sender is dropped.
fn progress_printer() -> (mpsc::Sender<FetchProgress>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<FetchProgress>(64);
    let handle = tokio::spawn(async move {
        let mut last_step = None;
        while let Some(progress) = rx.recv().await {
            match progress.percent() {
                Some(percent) => {
                    let step = (percent / 10.0) as u32;
                    if last_step != Some(step) {
                        last_step = Some(step);
                        info!("Downloading: {:.0}%", percent);
                    }
                }
                None => {
                    let mib = progress.bytes_received / (1024 * 1024);
                    if last_step != Some(mib as u32) {
                        last_step = Some(mib as u32);
                        info!("Downloading: {} MiB", mib);
                    }
                }
            }
        }
    });
    (tx, handle)
}

fn print_session(report: &SessionReport) {
    let how = match report.end {
        SessionEnd::GameExited => "game server exited",
        SessionEnd::Interrupted => "stopped on request",
        SessionEnd::Forced => "forced stop",
    };
    println!("Session ended: {}", how);
    println!(
        "  {:<12} {:?}{}",
        report.game.kind.to_string(),
        report.game.status,
        report
            .game
            .exit_code
            .map(|c| format!(" (exit code {})", c))
            .unwrap_or_default()
    );
    if let Some(tunnel) = &report.tunnel {
        println!("  {:<12} {:?}", tunnel.kind.to_string(), tunnel.status);
    }
    if !report.all_stopped() {
        warn!("Some processes did not report a clean stop");
    }
}

fn print_status(report: &StatusReport) {
    println!("Server directory: {}", report.server_dir.display());
    match &report.stored {
        Some(stored) => println!(
            "Profile: {} {}{} (created {})",
            stored.profile.variant(),
            stored.profile.game_version(),
            stored
                .profile
                .pinned_build()
                .map(|b| format!(" build {}", b))
                .unwrap_or_default(),
            stored.profile.created_at().format("%Y-%m-%d %H:%M UTC")
        ),
        None => println!("Profile: none (run `craftgate create <variant> <version>`)"),
    }

    let check = |done: bool| if done { "x" } else { " " };
    let state = &report.state;
    println!("  [{}] server jar", check(state.server_binary_present));
    println!("  [{}] eula accepted", check(state.license_accepted));
    println!("  [{}] server.properties", check(state.properties_written));

    let deps: Vec<&str> = state
        .dependencies_installed
        .iter()
        .map(String::as_str)
        .collect();
    println!(
        "Installed components: {}",
        if deps.is_empty() {
            "none".to_string()
        } else {
            deps.join(", ")
        }
    );
    match report.java_major {
        Some(major) => println!("Java: {}", major),
        None => println!("Java: not found"),
    }

    if !report.relay_enabled {
        println!("Relay: disabled");
    }
    match report.stored.as_ref().and_then(|s| s.tunnel.as_ref()) {
        Some(t) if t.valid => println!("Endpoint: {} ({:?})", t.endpoint, t.source),
        Some(t) => println!("Endpoint: {} (stale)", t.endpoint),
        None => println!("Endpoint: none"),
    }
    println!("Relay log: {}", report.relay_log.display());
}

fn print_deleted(report: &DeleteReport) {
    if report.removed.is_empty() {
        println!("Nothing to delete");
    }
    for path in &report.removed {
        println!("Removed {}", path.display());
    }
}
