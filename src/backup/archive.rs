// pg_drive_backup/src/backup/archive.rs
use chrono::{DateTime, Local, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Builder;

use crate::errors::{AppError, Result};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A compressed dump on local disk, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub database: String,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl BackupArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn dump_file_name(timestamp: &str) -> String {
    format!("postgres_dump_{}.sql", timestamp)
}

pub fn archive_file_name(timestamp: &str) -> String {
    format!("postgres_backup_{}.tar.gz", timestamp)
}

/// Wraps `input_path` in a `.tar.gz` next to it and removes the input.
///
/// Only the base file name goes into the archive, so extraction yields a
/// single flat file. On failure both the input and any partial archive are
/// removed.
pub fn archive(input_path: &Path, database: &str, created_at: DateTime<Local>) -> Result<BackupArtifact> {
    let archive_path = input_path.with_file_name(archive_file_name(&timestamp(&created_at)));
    tracing::info!(
        "Compressing {} to {}",
        input_path.display(),
        archive_path.display()
    );

    match write_tar_gz(input_path, &archive_path) {
        Ok(size_bytes) => {
            fs::remove_file(input_path).map_err(|e| {
                AppError::Compression(format!(
                    "archive created but raw dump {} could not be removed: {}",
                    input_path.display(),
                    e
                ))
            })?;
            tracing::info!(
                "Archive {} created ({} bytes)",
                archive_path.display(),
                size_bytes
            );
            Ok(BackupArtifact {
                database: database.to_string(),
                created_at: created_at.with_timezone(&Utc),
                path: archive_path,
                size_bytes,
            })
        }
        Err(e) => {
            remove_if_present(input_path);
            remove_if_present(&archive_path);
            Err(e)
        }
    }
}

fn write_tar_gz(input_path: &Path, archive_path: &Path) -> Result<u64> {
    let compression_err = |what: &str, e: std::io::Error| {
        AppError::Compression(format!("{} for {}: {}", what, archive_path.display(), e))
    };

    let entry_name = input_path.file_name().ok_or_else(|| {
        AppError::Compression(format!("input has no file name: {}", input_path.display()))
    })?;

    let archive_file =
        File::create(archive_path).map_err(|e| compression_err("failed to create archive file", e))?;
    let encoder = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    tar_builder
        .append_path_with_name(input_path, entry_name)
        .map_err(|e| compression_err("failed to append dump", e))?;

    let encoder = tar_builder
        .into_inner()
        .map_err(|e| compression_err("failed to finish tar stream", e))?;
    let archive_file = encoder
        .finish()
        .map_err(|e| compression_err("failed to finish gzip stream", e))?;
    archive_file
        .sync_all()
        .map_err(|e| compression_err("failed to flush archive", e))?;

    let size = fs::metadata(archive_path)
        .map_err(|e| compression_err("failed to stat archive", e))?
        .len();
    Ok(size)
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
