use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cairn",
    about = "Cairn - replicated content-addressed blob storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a node until interrupted
    Serve(ServeArgs),
    /// Store a file on a short-lived node and replicate it to its peers
    Put(PutArgs),
    /// Show where a key is stored on disk
    Path(PathArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub listen: Option<String>,
    #[arg(long)]
    pub root: Option<PathBuf>,
    #[arg(long)]
    pub bootstrap: Vec<String>,
}

#[derive(Args)]
pub struct PutArgs {
    pub key: String,
    pub file: PathBuf,
    #[arg(long, required = true)]
    pub bootstrap: Vec<String>,
    #[arg(long, default_value = "127.0.0.1:0")]
    pub listen: String,
    #[arg(long, default_value = cairn_store::DEFAULT_ROOT)]
    pub root: PathBuf,
    /// How long to wait for a peer before giving up
    #[arg(long, default_value = "5")]
    pub wait_secs: u64,
}

#[derive(Args)]
pub struct PathArgs {
    pub key: String,
    #[arg(long, default_value = cairn_store::DEFAULT_ROOT)]
    pub root: PathBuf,
    /// Use the un-hashed layout instead of the content-addressed one
    #[arg(long)]
    pub plain: bool,
}
