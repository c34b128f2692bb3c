//! compose-e2e - run end-to-end scenarios against a compose-style CLI

use std::path::PathBuf;

use clap::Parser;
use compose_e2e::commands::Commands;
use compose_e2e::common::logging;
use compose_e2e::cli;

#[derive(Parser)]
#[command(name = "compose-e2e", about = "End-to-end scenario harness for compose CLIs")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output and debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    match cli::dispatch(cli.command, cli.config, cli.verbose).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
