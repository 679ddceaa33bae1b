mod cli;
mod commands;

use clap::Parser;
use quire_config::Config;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

/// Build the log filter, letting `RUST_LOG` override the verbosity flags.
fn build_env_filter(verbose: u8, quiet: bool) -> EnvFilter {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // External crates stay at warn
        EnvFilter::new(format!(
            "warn,quire={level},quire_fs={level},quire_config={level}"
        ))
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(cli.verbose, cli.quiet))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    match &cli.command {
        Command::Cat(args) => commands::cat(&config, args).await,
        Command::Convert(args) => commands::convert(&config, args).await,
        Command::Encodings => commands::list_encodings(),
    }
}
