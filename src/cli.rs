//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use quire_fs::NewlineType;

#[derive(Parser)]
#[command(
    name = "quire",
    version,
    about = "Load, convert and inspect text documents in any supported charset"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file to use instead of the default search paths.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a document as UTF-8 and report how it was stored.
    Cat(CatArgs),

    /// Load a document and save it with another charset, newline style or compression.
    Convert(ConvertArgs),

    /// List the supported character encodings.
    Encodings,
}

#[derive(Args)]
pub struct CatArgs {
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Decode with this charset instead of auto-detecting.
    #[arg(long, value_name = "CHARSET")]
    pub encoding: Option<String>,
}

#[derive(Args)]
pub struct ConvertArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Charset of the input (default: auto-detect).
    #[arg(long, value_name = "CHARSET")]
    pub from: Option<String>,

    /// Charset of the output (default: the detected input charset).
    #[arg(long, value_name = "CHARSET")]
    pub to: Option<String>,

    /// Newline style of the output: lf, cr or crlf (default: as loaded).
    #[arg(long, value_name = "STYLE")]
    pub newline: Option<NewlineType>,

    /// Gzip the output. Implied by a `.gz` output name.
    #[arg(long)]
    pub gzip: bool,

    /// Save even if the input had bytes that could not be decoded.
    #[arg(long)]
    pub ignore_invalid: bool,

    /// Overwrite the output even if it changed since the input was loaded.
    #[arg(long)]
    pub force: bool,
}
