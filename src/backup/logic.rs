// pg_drive_backup/src/backup/logic.rs
use async_trait::async_trait;
use chrono::{Local, Utc};
use std::fmt;
use std::fs;
use std::path::Path;
use tempfile::{Builder as TempDirBuilder, TempDir};

use super::archive::{self, BackupArtifact};
use super::db_dump;
use crate::auth::CredentialStrategy;
use crate::config::AppConfig;
use crate::drive::{self, PruneReport, RemoteStore};
use crate::errors::Result;

const SCRATCH_PREFIX: &str = "pg_backup_";

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dump,
    Archive,
    Authenticate,
    EnsureFolder,
    Upload,
    Share,
    Prune,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dump => "dump",
            Stage::Archive => "archive",
            Stage::Authenticate => "authenticate",
            Stage::EnsureFolder => "ensure-folder",
            Stage::Upload => "upload",
            Stage::Share => "share",
            Stage::Prune => "prune",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub artifact: BackupArtifact,
    pub folder_id: String,
    pub object_id: String,
    pub shared: bool,
    /// `None` when pruning was disabled or its listing failed.
    pub pruned: Option<PruneReport>,
}

/// Authenticates and hands back a client for the remote store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, strategy: &CredentialStrategy) -> Result<Box<dyn RemoteStore>>;
}

/// Runs the full backup pipeline.
///
/// Every local file lives in a fresh scratch directory which is removed once
/// the pipeline ends, whether it succeeded or not.
pub async fn perform_backup_orchestration(
    app_config: &AppConfig,
    connector: &dyn StoreConnector,
) -> Result<BackupReport> {
    let scratch = create_scratch_dir(app_config.scratch_root.as_deref())?;
    tracing::debug!("Scratch directory: {}", scratch.path().display());

    let outcome = run_stages(app_config, connector, scratch.path()).await;
    cleanup(scratch);
    outcome
}

async fn run_stages(
    app_config: &AppConfig,
    connector: &dyn StoreConnector,
    scratch: &Path,
) -> Result<BackupReport> {
    let started = Local::now();
    let ts = archive::timestamp(&started);
    let dump_path = scratch.join(archive::dump_file_name(&ts));

    db_dump::produce(&app_config.database, &app_config.pg_dump_cmd, &dump_path)
        .await
        .inspect_err(|e| fatal(Stage::Dump, e))?;

    let artifact = archive::archive(&dump_path, &app_config.database.name, started)
        .inspect_err(|e| fatal(Stage::Archive, e))?;

    let store = connector
        .connect(&app_config.credential_strategy)
        .await
        .inspect_err(|e| fatal(Stage::Authenticate, e))?;

    let folder_id = drive::find_or_create_folder(store.as_ref(), &app_config.drive.folder_name)
        .await
        .inspect_err(|e| fatal(Stage::EnsureFolder, e))?;

    let object = store
        .upload(&artifact.path, &folder_id)
        .await
        .inspect_err(|e| fatal(Stage::Upload, e))?;

    let shared = match drive::share_object(
        store.as_ref(),
        &object.id,
        app_config.drive.share_email.as_deref(),
        &app_config.drive.share_role,
    )
    .await
    {
        Ok(shared) => shared,
        Err(e) => {
            tracing::warn!(stage = %Stage::Share, "Sharing the backup failed: {}", e);
            false
        }
    };

    let pruned = if app_config.retention_days <= 0 {
        tracing::info!("Retention disabled, skipping removal of old backups");
        None
    } else {
        match drive::retention_cutoff(Utc::now(), app_config.retention_days) {
            None => {
                tracing::warn!(
                    stage = %Stage::Prune,
                    "Retention of {} days reaches past the earliest supported date, nothing to prune",
                    app_config.retention_days
                );
                None
            }
            Some(cutoff) => match drive::prune_older_than(store.as_ref(), &folder_id, cutoff).await {
                Ok(report) => {
                    if !report.failed.is_empty() {
                        tracing::warn!(
                            stage = %Stage::Prune,
                            "{} old backup(s) could not be deleted",
                            report.failed.len()
                        );
                    }
                    Some(report)
                }
                Err(e) => {
                    tracing::warn!(stage = %Stage::Prune, "Error deleting old backups from Google Drive: {}", e);
                    None
                }
            },
        }
    };

    Ok(BackupReport {
        artifact,
        folder_id,
        object_id: object.id,
        shared,
        pruned,
    })
}

fn fatal(stage: Stage, error: &crate::errors::AppError) {
    tracing::error!(stage = %stage, "Backup aborted: {}", error);
}

fn create_scratch_dir(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = TempDirBuilder::new();
    builder.prefix(SCRATCH_PREFIX);
    match root {
        Some(root) => {
            fs::create_dir_all(root)?;
            Ok(builder.tempdir_in(root)?)
        }
        None => Ok(builder.tempdir()?),
    }
}

/// Best effort: a failure here is logged and never changes the run's outcome.
fn cleanup(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    match scratch.close() {
        Ok(()) => tracing::debug!("Removed scratch directory {}", path.display()),
        Err(e) => tracing::warn!(
            stage = %Stage::Cleanup,
            "Failed to remove scratch directory {}: {}",
            path.display(),
            e
        ),
    }
}
