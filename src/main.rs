mod cli;
mod config;
mod dispatcher;
mod error;
mod importers;
mod models;
mod tax;
mod utils;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = config::EngineConfig::load_or_default(cli.config.as_deref())?;
    dispatcher::dispatch_command(cli.command, &config, cli.json)
}
