//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const SERVER_HELP: &str = "Server name from the config [default: default]";

/// Manage game servers running in tmux sessions.
///
/// Start, stop and restart servers gracefully, send console commands, and
/// take consistent backups while players stay online.
#[derive(Debug, Parser)]
#[command(name = "mcr", version)]
pub struct Cli {
    /// Manage the servers configured for this user
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Config directory or file [default: ~<user>/.config/mcr]
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List configured servers and whether they are running
    List,

    /// Show whether a server is running (exit status 3 when stopped)
    Status(ServerArgs),

    /// Start a server in a new tmux session
    Start(ServerArgs),

    /// Warn players, save and stop a server
    #[command(after_help = "\
Examples:
  mcr stop survival                         # Warn, wait 30s, save, stop
  mcr stop survival -d 0 -m ''              # Stop right away without a broadcast
  mcr stop survival -w 120                  # Give a slow server two minutes")]
    Stop(StopArgs),

    /// Stop a server if it is running, then start it
    Restart(RestartArgs),

    /// Send a console command
    #[command(after_help = "\
Examples:
  mcr send survival say Back in five        # Words are joined with spaces
  mcr send survival whitelist add Notch")]
    Send(SendArgs),

    /// Attach this terminal to the server console
    Attach(ServerArgs),

    /// Force-destroy the tmux session (the server process may survive)
    Kill(ServerArgs),

    /// Copy the server directory into its backup directory
    Backup(BackupArgs),

    /// Update server plugins (not implemented)
    Update(UpdateArgs),

    /// Write an example config file
    Mkconfig(MkconfigArgs),
}

#[derive(Debug, clap::Args)]
pub struct ServerArgs {
    #[arg(default_value = "default", help = SERVER_HELP)]
    pub server: String,
}

#[derive(Debug, clap::Args)]
pub struct StopArgs {
    #[arg(default_value = "default", help = SERVER_HELP)]
    pub server: String,

    /// Seconds to wait for the server to exit after `stop`
    #[arg(short, long, default_value_t = 30)]
    pub wait: u64,

    /// Broadcast before stopping; pass '' to skip [default: "Server stopping in <delay> seconds..."]
    #[arg(short, long)]
    pub message: Option<String>,

    /// Seconds between the broadcast and the save
    #[arg(short, long, default_value_t = 30)]
    pub delay: u64,
}

#[derive(Debug, clap::Args)]
pub struct RestartArgs {
    #[arg(default_value = "default", help = SERVER_HELP)]
    pub server: String,

    /// Seconds to wait for the server to exit after `stop`
    #[arg(short, long, default_value_t = 60)]
    pub wait: u64,

    /// Broadcast before stopping [default: "Restarting server in <delay> seconds"]
    #[arg(short, long)]
    pub message: Option<String>,

    /// Seconds between the broadcast and the save
    #[arg(short, long, default_value_t = 60)]
    pub delay: u64,
}

#[derive(Debug, clap::Args)]
pub struct SendArgs {
    /// Server name from the config
    pub server: String,

    /// Console command and its arguments
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct BackupArgs {
    #[arg(default_value = "default", help = SERVER_HELP)]
    pub server: String,

    /// Also copy to the configured remote (not implemented)
    #[arg(long)]
    pub remote: bool,
}

#[derive(Debug, clap::Args)]
pub struct UpdateArgs {
    #[arg(default_value = "default", help = SERVER_HELP)]
    pub server: String,

    /// Plugin to update
    #[arg(default_value = "all")]
    pub plugin: String,
}

#[derive(Debug, clap::Args)]
pub struct MkconfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
