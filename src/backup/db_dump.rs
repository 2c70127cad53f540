// pg_drive_backup/src/backup/db_dump.rs
use std::path::Path;
use tokio::process::Command;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::utils::find_executable;

/// Dumps `database` to `destination` as plain SQL using pg_dump.
///
/// The password only reaches the child through `PGPASSWORD`. A failed run may
/// leave a partial file behind; the caller owns cleanup of `destination`.
pub async fn produce(database: &DatabaseConfig, pg_dump_cmd: &str, destination: &Path) -> Result<()> {
    let pg_dump_path = find_executable(pg_dump_cmd)?;
    tracing::info!("Creating PostgreSQL backup: {}", destination.display());
    tracing::debug!("Using pg_dump executable at {}", pg_dump_path.display());

    let output = Command::new(&pg_dump_path)
        .env("PGPASSWORD", database.password.expose())
        .arg("-h")
        .arg(&database.host)
        .arg("-p")
        .arg(database.port.to_string())
        .arg("-U")
        .arg(&database.user)
        .arg("-F")
        .arg("p") // plain text compresses better than the custom format
        .arg("-b") // include large objects
        .arg("-v")
        .arg("-f")
        .arg(destination)
        .arg(&database.name)
        .output()
        .await?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        tracing::error!("Backup failed: {}", stderr);
        return Err(AppError::Command {
            program: pg_dump_path.display().to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    // pg_dump -v reports progress on stderr.
    if !stderr.is_empty() {
        tracing::debug!("pg_dump output: {}", stderr);
    }
    tracing::info!("Database dump of {} completed", database.name);
    Ok(())
}
