// pg_drive_backup/src/config/mod.rs
use chrono::Utc;
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::auth::CredentialStrategy;
use crate::drive;
use crate::errors::{AppError, Result};

pub const DEFAULT_PG_PORT: &str = "5432";
pub const DEFAULT_PG_DUMP_CMD: &str = "pg_dump";
pub const DEFAULT_RETENTION_DAYS: &str = "7";
pub const DEFAULT_DRIVE_FOLDER: &str = "postgres_backups";
pub const DEFAULT_SHARE_ROLE: &str = "reader";
pub const DEFAULT_TOKEN_PATH: &str = "/secrets/token.json";
pub const DEFAULT_CREDENTIALS_FILE: &str = "/secrets/credentials.json";
pub const DEFAULT_LOG_FILTER: &str = "pg_drive_backup=info";

/// String whose value never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub folder_name: String,
    pub share_email: Option<String>,
    pub share_role: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pg_dump_cmd: String,
    /// `<= 0` disables remote pruning.
    pub retention_days: i64,
    pub drive: DriveConfig,
    pub credential_strategy: CredentialStrategy,
    /// Parent of the per-run scratch directory; system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

/// Logging settings. Resolved before [`AppConfig`] so configuration errors
/// are themselves logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        LoggingConfig {
            filter: value("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_file: value("LOG_FILE").map(PathBuf::from),
        }
    }
}

/// Reads `name` from the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Resolves a single setting.
///
/// Empty values are treated as absent. A missing `required` setting is a
/// configuration error; everything else falls back to `default`.
pub fn resolve<F>(lookup: &F, name: &str, default: Option<&str>, required: bool) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| default.map(str::to_string));

    if required && value.is_none() {
        return Err(AppError::Config(format!(
            "Required environment variable {} is not set",
            name
        )));
    }
    Ok(value)
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    resolve(lookup, name, None, true)?
        .ok_or_else(|| AppError::Config(format!("Required environment variable {} is not set", name)))
}

fn with_default<F>(lookup: &F, name: &str, default: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(resolve(lookup, name, Some(default), false)?.unwrap_or_else(|| default.to_string()))
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port_raw = with_default(&lookup, "PGPORT", DEFAULT_PG_PORT)?;
        let database = DatabaseConfig {
            host: required(&lookup, "PGHOST")?,
            port: port_raw
                .trim()
                .parse()
                .map_err(|_| AppError::InvalidInput(format!("PGPORT is not a valid port: {}", port_raw)))?,
            user: required(&lookup, "PGUSER")?,
            password: Secret::new(required(&lookup, "PGPASSWORD")?),
            name: required(&lookup, "PGDATABASE")?,
        };

        let retention_raw = with_default(&lookup, "RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?;
        let retention_days = retention_raw.trim().parse::<i64>().map_err(|_| {
            AppError::InvalidInput(format!("RETENTION_DAYS is not an integer: {}", retention_raw))
        })?;
        if retention_days > 0 && drive::retention_cutoff(Utc::now(), retention_days).is_none() {
            return Err(AppError::InvalidInput(format!(
                "RETENTION_DAYS is out of range: {}",
                retention_days
            )));
        }

        let drive = DriveConfig {
            folder_name: with_default(&lookup, "GDRIVE_FOLDER", DEFAULT_DRIVE_FOLDER)?,
            share_email: resolve(&lookup, "SHARE_EMAIL", None, false)?,
            share_role: with_default(&lookup, "SHARE_ROLE", DEFAULT_SHARE_ROLE)?,
        };

        Ok(AppConfig {
            database,
            pg_dump_cmd: with_default(&lookup, "PG_DUMP_CMD", DEFAULT_PG_DUMP_CMD)?,
            retention_days,
            drive,
            credential_strategy: resolve_credential_strategy(&lookup)?,
            scratch_root: resolve(&lookup, "BACKUP_DIR", None, false)?.map(PathBuf::from),
        })
    }
}

/// Picks the credential strategy once, from whichever inputs are configured.
fn resolve_credential_strategy<F>(lookup: &F) -> Result<CredentialStrategy>
where
    F: Fn(&str) -> Option<String>,
{
    let token_path = PathBuf::from(with_default(lookup, "TOKEN_PATH", DEFAULT_TOKEN_PATH)?);
    let service_account = resolve(lookup, "GOOGLE_SERVICE_ACCOUNT", None, false)?.map(Secret::new);
    let client_secret = load_client_secret(lookup)?;

    if let Some(explicit) = resolve(lookup, "AUTH_STRATEGY", None, false)? {
        return match explicit.trim().to_ascii_lowercase().as_str() {
            "service-account" | "service_account" => service_account
                .map(|key| CredentialStrategy::ServiceAccount { key })
                .ok_or_else(|| {
                    AppError::Config(
                        "AUTH_STRATEGY=service-account requires GOOGLE_SERVICE_ACCOUNT".to_string(),
                    )
                }),
            "interactive" => client_secret
                .map(|client_secret| CredentialStrategy::Interactive {
                    token_path,
                    client_secret,
                })
                .ok_or_else(|| {
                    AppError::Config(
                        "AUTH_STRATEGY=interactive requires GOOGLE_CREDENTIALS or a credentials file"
                            .to_string(),
                    )
                }),
            "stored" | "stored-token" => Ok(CredentialStrategy::StoredToken {
                token_path,
                client_secret,
            }),
            other => Err(AppError::Config(format!(
                "Unknown AUTH_STRATEGY '{}' (expected stored, interactive or service-account)",
                other
            ))),
        };
    }

    if let Some(key) = service_account {
        return Ok(CredentialStrategy::ServiceAccount { key });
    }
    if token_path.is_file() {
        return Ok(CredentialStrategy::StoredToken {
            token_path,
            client_secret,
        });
    }
    match client_secret {
        Some(client_secret) => Ok(CredentialStrategy::Interactive {
            token_path,
            client_secret,
        }),
        None => Err(AppError::Config(format!(
            "No Google credentials configured: set GOOGLE_SERVICE_ACCOUNT or GOOGLE_CREDENTIALS, or provide a token at {}",
            token_path.display()
        ))),
    }
}

/// `GOOGLE_CREDENTIALS` wins; otherwise the client-secret file is read if it exists.
fn load_client_secret<F>(lookup: &F) -> Result<Option<Secret>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(inline) = resolve(lookup, "GOOGLE_CREDENTIALS", None, false)? {
        return Ok(Some(Secret::new(inline)));
    }
    let path = PathBuf::from(with_default(lookup, "GOOGLE_CREDENTIALS_FILE", DEFAULT_CREDENTIALS_FILE)?);
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).map_err(|e| {
        AppError::Config(format!("Failed to read client secret file {}: {}", path.display(), e))
    })?;
    Ok(Some(Secret::new(content)))
}
