//! Remote store: a Google Drive folder holding the backup archives.
//!
//! [`RemoteStore`] exposes the raw Drive calls; the free functions here hold
//! the backup-specific policy (folder reuse, optional sharing, retention sweep).

pub(crate) mod client;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::Path;

use crate::errors::Result;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    #[serde(rename = "createdTime", default)]
    pub created_time: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Non-trashed folders named exactly `name`, in service order.
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>>;

    async fn create_folder(&self, name: &str) -> Result<RemoteFolder>;

    /// Uploads `local_path` into `folder_id` under its base file name.
    async fn upload(&self, local_path: &Path, folder_id: &str) -> Result<RemoteObject>;

    async fn share(&self, object_id: &str, email: &str, role: &str) -> Result<()>;

    /// Non-trashed objects in `folder_id` created strictly before `cutoff`.
    async fn list_created_before(
        &self,
        folder_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RemoteObject>>;

    async fn delete(&self, object_id: &str) -> Result<()>;
}

pub async fn find_or_create_folder(store: &dyn RemoteStore, name: &str) -> Result<String> {
    let folders = store.find_folders(name).await?;
    if let Some(first) = folders.first() {
        if folders.len() > 1 {
            tracing::warn!(
                "Found {} folders named '{}', using the first one ({})",
                folders.len(),
                name,
                first.id
            );
        } else {
            tracing::info!("Found existing folder: {}", name);
        }
        return Ok(first.id.clone());
    }

    tracing::info!("Creating new folder: {}", name);
    let folder = store.create_folder(name).await?;
    Ok(folder.id)
}

/// Grants `share_email` access to the object. Returns `false` when no
/// principal is configured.
pub async fn share_object(
    store: &dyn RemoteStore,
    object_id: &str,
    share_email: Option<&str>,
    role: &str,
) -> Result<bool> {
    let Some(email) = share_email else {
        tracing::warn!("SHARE_EMAIL not set, backup is not shared with anyone");
        return Ok(false);
    };
    store.share(object_id, email, role).await?;
    tracing::info!("Shared backup {} with {} as {}", object_id, email, role);
    Ok(true)
}

/// `None` when pruning is disabled (`retention_days <= 0`) or the cutoff
/// would fall before the earliest representable date.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> Option<DateTime<Utc>> {
    if retention_days <= 0 {
        return None;
    }
    Duration::try_days(retention_days).and_then(|span| now.checked_sub_signed(span))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Deletes every object older than `cutoff`. Each deletion stands alone:
/// a failure is logged and the sweep moves on. Only a failed listing is an error.
pub async fn prune_older_than(
    store: &dyn RemoteStore,
    folder_id: &str,
    cutoff: DateTime<Utc>,
) -> Result<PruneReport> {
    let stale = store.list_created_before(folder_id, cutoff).await?;
    let mut report = PruneReport::default();

    for object in stale {
        match store.delete(&object.id).await {
            Ok(()) => {
                tracing::info!("Deleted old backup from Google Drive: {}", object.name);
                report.deleted.push(object.name);
            }
            Err(e) => {
                tracing::warn!("Failed to delete old backup {}: {}", object.name, e);
                report.failed.push(object.name);
            }
        }
    }
    Ok(report)
}

/// Escapes a value for a single-quoted Drive query string literal.
pub(crate) fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
