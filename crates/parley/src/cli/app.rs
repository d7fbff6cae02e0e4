use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{ingest::IngestArgs, list::ListArgs, show::ShowArgs};

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    version,
    about = "Safe conversation ingestion into an embedded key-value store"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse, normalize and store every conversation file in a directory.
    Ingest(IngestArgs),
    /// Print one stored conversation.
    Show(ShowArgs),
    /// List stored keys in byte order.
    List(ListArgs),
}
