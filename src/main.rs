mod cli;
mod cli_utils;
mod commands;
mod merger;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use tagstash::logging;

fn main() -> Result<()> {
    // Initialize structured logging
    logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Config(args) => commands::config::run(args.command),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Settings(args) => commands::settings::run(args.command),
        Commands::Replay(args) => commands::replay::run(args),
    }
}
