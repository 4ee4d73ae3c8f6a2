mod cli;
mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use roomlog_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomlog=info".into()),
        )
        .init();

    let args = cli::Cli::parse();
    let config = commands::Config::from_env()?;

    // Schema bootstrap happens here, once per process.
    let db = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);
    info!("Using archive at {}", config.db_path);

    commands::run(args.command, db, &config).await?;

    println!("Done.");
    Ok(())
}
