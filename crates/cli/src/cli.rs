//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use craftgate_core::{Region, Variant};

#[derive(Parser)]
#[command(
    name = "craftgate",
    version,
    about = "Provision a Minecraft server and expose it through a relay tunnel"
)]
pub struct Cli {
    /// Configuration file; built-in defaults are used when it is missing.
    #[arg(
        long,
        global = true,
        env = "CRAFTGATE_CONFIG",
        default_value = "craftgate.toml"
    )]
    pub config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download a server and write its files, replacing any previous profile.
    Create(CreateArgs),
    /// Repair anything missing, then run the server (and tunnel) until it exits or Ctrl+C.
    Start(StartArgs),
    /// Show the stored profile, provisioning checklist and endpoint.
    Status,
    /// Print the command that starts the server by hand.
    ShowCommand,
    /// Manage the public endpoint.
    #[command(subcommand)]
    Tunnel(TunnelCommand),
    /// Remove the server directory, stored profile and relay log.
    Delete(DeleteArgs),
    /// List variants and suggested game versions.
    Versions(VersionsArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    /// vanilla, paper, purpur, fabric, forge or hybrid.
    pub variant: Variant,
    /// Game version, e.g. 1.20.4.
    pub version: String,
    /// Pin a specific build (paper, purpur).
    #[arg(long)]
    pub build: Option<u32>,
    /// Download the jar again even if a valid one exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct StartArgs {
    /// Run without the relay tunnel.
    #[arg(long)]
    pub no_tunnel: bool,
    /// Relay region for this session.
    #[arg(long)]
    pub region: Option<Region>,
}

#[derive(Subcommand)]
pub enum TunnelCommand {
    /// Save an endpoint copied from the relay dashboard, as host:port.
    Set {
        address: String,
        #[arg(long)]
        region: Option<Region>,
    },
    /// Print the stored endpoint.
    Show,
    /// List relay regions.
    Regions,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Confirm deletion.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct VersionsArgs {
    /// Query the vanilla manifest instead of the configured list.
    #[arg(long)]
    pub remote: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from(["craftgate", "create", "paper", "1.20.4", "--build", "499"])
            .unwrap();
        match cli.command {
            Command::Create(args) => {
                assert_eq!(args.variant, Variant::Paper);
                assert_eq!(args.version, "1.20.4");
                assert_eq!(args.build, Some(499));
                assert!(!args.force);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_parse_mohist_alias() {
        let cli = Cli::try_parse_from(["craftgate", "create", "mohist", "1.20.1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Create(CreateArgs {
                variant: Variant::Hybrid,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_start_region() {
        let cli = Cli::try_parse_from(["craftgate", "start", "--region", "eu"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Start(StartArgs {
                region: Some(Region::Eu),
                no_tunnel: false
            })
        ));
    }

    #[test]
    fn test_rejects_unknown_variant() {
        assert!(Cli::try_parse_from(["craftgate", "create", "bukkit", "1.20.4"]).is_err());
    }
}
