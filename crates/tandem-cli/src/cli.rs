use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use tandem_types::AccessMode;

#[derive(Parser)]
#[command(
    name = "tandem",
    about = "Tandem: redundant accessor dispatch over replicated and sharded stores",
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

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show how each group of a topology resolves
    Plan(PlanArgs),
    /// Build a topology over in-memory stores and exercise every group
    Check(CheckArgs),
}

#[derive(Args)]
pub struct PlanArgs {
    /// Topology file (TOML)
    pub file: PathBuf,
    /// Override the topology's requested access mode (e.g. `read|write`)
    #[arg(long)]
    pub mode: Option<AccessMode>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Topology file (TOML)
    pub file: PathBuf,
    /// Override the topology's requested access mode
    #[arg(long)]
    pub mode: Option<AccessMode>,
    /// Entity type counted on every group
    #[arg(long, default_value = "record")]
    pub entity: String,
}
