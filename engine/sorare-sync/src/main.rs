//! # Sorare Sync Binary

use anyhow::Result;
use clap::Parser;
use sorare_sync::{initialize_logging, load_config, Cli, CliHandler};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up credentials from .env when present
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = load_config(&cli.overrides())?;
    initialize_logging(&config.logging)?;

    info!("Starting sorare-sync {:?}", cli.command);

    let handler = CliHandler::new(config);
    if let Err(e) = handler.handle_command(cli.command).await {
        error!("Command failed: {:#}", e);
        return Err(e);
    }

    Ok(())
}
