use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use pgscout::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Version => {
            println!("pgscout v{}", env!("CARGO_PKG_VERSION"));
        }
        cli::Commands::Check => {
            init_tracing("warn", false);
            commands::check::execute(&args.config)?;
        }
        command => {
            let cfg = config::load_config(&args.config)?;
            init_tracing(&cfg.log_level, cfg.log_format == "json");

            if command == cli::Commands::Once {
                commands::once::execute(cfg).await?;
            } else {
                commands::run::execute(cfg).await?;
            }
        }
    }

    Ok(())
}
