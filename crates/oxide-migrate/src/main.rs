//! oxide-migrate CLI
//!
//! Command-line tool for applying SQL migrations.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use oxide_migrate::cli::{self, Cli};
use oxide_migrate::MigrationRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Code migrations are registered by binaries embedding `cli::run`.
    let registry = MigrationRegistry::new();
    let code = cli::run(cli, &registry, &mut std::io::stdout()).await?;
    Ok(ExitCode::from(code))
}
