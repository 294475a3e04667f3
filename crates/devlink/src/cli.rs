//! Clap derive structures for the `devlink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// devlink -- drive a session-based device endpoint from the command line
#[derive(Debug, Parser)]
#[command(
    name = "devlink",
    version,
    about = "Poll and configure session-based devices",
    long_about = "Runs the devlink executor against one configured device profile.\n\n\
        All traffic goes through a single authenticated session: one request\n\
        at a time, re-authenticating lazily and retrying failed commands.",
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

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "DEVLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "DEVLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Emit channel values as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the executor and stream channel values until Ctrl-C
    Run(RunArgs),

    /// Write one channel value and wait for the device to accept it
    Set(SetArgs),

    /// Validate the profile without sending anything (or log in once)
    Check(CheckArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Status poll interval in seconds (overrides profile)
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Channel identifier
    pub channel: String,

    /// Value to write
    pub value: String,

    /// Seconds to wait for the write to be accepted
    #[arg(long, default_value = "60")]
    pub wait: u64,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Also perform one login round trip
    #[arg(long)]
    pub login: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// List configured profiles
    Profiles,
    /// Make a profile the default
    Use {
        /// Profile name
        name: String,
    },
}
