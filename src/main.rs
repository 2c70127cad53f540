//! PostgreSQL to Google Drive backup
//!
//! Dumps one database, compresses it, uploads it to a Drive folder and prunes
//! old copies. Configured entirely through environment variables; meant to be
//! run by an external scheduler.

// pg_drive_backup/src/main.rs
mod auth;
mod backup;
mod config;
mod drive;
mod errors;
mod utils;

use anyhow::{Context, Result};
use config::{AppConfig, DEFAULT_LOG_FILTER, LoggingConfig};
use errors::AppError;
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing(&LoggingConfig::from_env());

    match run_app().await {
        Ok(()) => {
            tracing::info!("Backup process completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let kind = e
                .downcast_ref::<AppError>()
                .or_else(|| e.chain().find_map(|cause| cause.downcast_ref::<AppError>()))
                .map(AppError::kind)
                .unwrap_or("runtime");
            tracing::error!(kind, "Backup failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let app_config = AppConfig::from_env().context("Failed to load configuration from environment")?;

    let report = backup::run_backup_flow(&app_config)
        .await
        .context("Backup process failed")?;

    tracing::info!(
        database = %report.artifact.database,
        created_at = %report.artifact.created_at,
        file = %report.artifact.file_name(),
        bytes = report.artifact.size_bytes,
        folder_id = %report.folder_id,
        object_id = %report.object_id,
        shared = report.shared,
        pruned = report.pruned.as_ref().map_or(0, |p| p.deleted.len()),
        "Backup uploaded"
    );
    Ok(())
}

/// stderr always; `LOG_FILE` additionally gets an append-only copy.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.filter).unwrap_or_else(|e| {
        eprintln!("Invalid RUST_LOG '{}' ({}), using {}", logging.filter, e, DEFAULT_LOG_FILTER);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let file_layer = logging.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}
