//! Clap derive structures for the `hikbot` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// hikbot -- Telegram bot for Hikvision cameras
#[derive(Debug, Parser)]
#[command(
    name = "hikbot",
    version,
    about = "Control Hikvision cameras from Telegram",
    long_about = "Telegram bot for Hikvision IP cameras.\n\n\
        Takes snapshots and short videos on request, forwards motion, line\n\
        crossing and intrusion alerts, and runs ffmpeg livestreams.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "HIKBOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the bot and all camera services enabled in the config
    Run,

    /// Load and validate the config, then print a summary
    #[command(alias = "check")]
    CheckConfig,

    /// Write a starter config file
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
