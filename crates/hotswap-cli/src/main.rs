//! hotswap CLI - run and inspect a hot-reloading plugin directory

mod cli;
mod commands;
mod console;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stdout, so logs stay on stderr.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Watch { dir, enable } => {
            let config = commands::resolve_config(cli.config.as_deref(), dir)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::watch::run(config, enable))
        }
        Commands::Scan { dir, json } => {
            let config = commands::resolve_config(cli.config.as_deref(), dir)?;
            commands::scan::run(config, json)
        }
    }
}
