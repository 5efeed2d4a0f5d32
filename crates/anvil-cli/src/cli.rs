use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "anvil", about = "Anvil forge hosting core", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository to operate on.
    #[arg(short = 'R', long, global = true, default_value = ".")]
    pub repo: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new repository
    Init(InitArgs),
    /// Run the hosting server
    Serve(ServeArgs),
    /// Show the current operation heads and their references
    Heads,
    /// Show the operation log, newest first
    Log(LogArgs),
    /// Verify every reachable object
    Fsck,
    /// Fetch operations and objects from a server
    Fetch(RemoteArgs),
    /// Push local operations to a server
    Push(PushArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Directory to create; defaults to `--repo`.
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override `repos_root`.
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Override `sync_addr`.
    #[arg(long)]
    pub sync_addr: Option<SocketAddr>,
    /// Override `http_addr`.
    #[arg(long)]
    pub http_addr: Option<SocketAddr>,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct RemoteArgs {
    /// Address of the server's sync listener.
    pub addr: String,
    /// Repository name on the server.
    pub name: String,
    /// Bearer token presented on connect.
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct PushArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,
    /// Bookmarks to report results for; all local bookmarks when omitted.
    #[arg(short, long = "bookmark")]
    pub bookmarks: Vec<String>,
}
