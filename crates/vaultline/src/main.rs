//! Vaultline CLI - secret distribution and deployment environments
//!
//! This is the main entry point for the Vaultline command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let global = cli.global();
    match cli.command {
        Commands::Sync(args) => commands::sync::run(args, &global).await,
        Commands::SyncAll(args) => commands::sync::run_all(args, &global).await,
        Commands::Remove(args) => commands::sync::remove(args, &global).await,
        Commands::Provision(args) => commands::provision::run(args, &global).await,
        Commands::Quota(args) => commands::quota::run(args, &global).await,
        Commands::Exclusions(cmd) => commands::exclusions::run(cmd, &global).await,
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
