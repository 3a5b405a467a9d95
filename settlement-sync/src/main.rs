use anyhow::Result;
use clap::Parser;
use settlement_sync::cli::{run, Cli};
use settlement_sync::load_config::peek_log_dir;
use settlement_sync::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let log_file = logging::init(peek_log_dir(cli.command.config_path()).as_deref())?;
    tracing::info!(
        log_file = ?log_file,
        "CLI application startup: tracing initialised, environment loaded"
    );

    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("CLI completed successfully"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result
}
