//! Command line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use eyre::Result;

use crate::{
    config::{DirectoryArgs, NetworkArgs, ParleyConfig, PeerArgs, TimeoutArgs},
    logging::init_logging,
};

/// Peer-to-peer chat over relays, with an SS58 address directory.
#[derive(Debug, Parser)]
#[command(name = "parley", version, about)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    /// TOML config file. Command line flags override it.
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run a relay: circuit relay server plus the address directory.
    Relay(RelayCommand),
    /// Run a peer with an interactive console.
    Peer(PeerCommand),
}

#[derive(Debug, Args)]
pub(crate) struct RelayCommand {
    #[command(flatten)]
    pub(crate) network: NetworkArgs,

    #[command(flatten)]
    pub(crate) directory: DirectoryArgs,
}

#[derive(Debug, Args)]
pub(crate) struct PeerCommand {
    #[command(flatten)]
    pub(crate) network: NetworkArgs,

    #[command(flatten)]
    pub(crate) peer: PeerArgs,

    #[command(flatten)]
    pub(crate) timeouts: TimeoutArgs,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Silence all output.
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv, -vvv, etc.).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbosity: u8,

    /// Log filter directive (e.g., "parley_node=debug,libp2p=info").
    #[arg(long = "log.filter", global = true, value_name = "DIRECTIVE")]
    pub(crate) filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json", global = true)]
    pub(crate) json: bool,
}

/// Parse the command line, load the config and run the chosen command.
pub(crate) async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.logs)?;

    let mut config = ParleyConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Relay(cmd) => {
            config.network.merge(cmd.network);
            config.directory.merge(cmd.directory);
            crate::relay::run(config).await
        }
        Command::Peer(cmd) => {
            config.network.merge(cmd.network);
            config.peer.merge(cmd.peer);
            config.timeouts.merge(cmd.timeouts);
            crate::peer::run(config).await
        }
    }
}
