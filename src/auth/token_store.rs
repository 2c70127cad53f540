// pg_drive_backup/src/auth/token_store.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::oauth::ClientSecret;
use super::{Credential, DEFAULT_TOKEN_URI, DRIVE_SCOPE, TokenResponse};
use crate::errors::Result;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Token file in Google's "authorized user" layout, so files written by other
/// Google client libraries can be reused.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl StoredToken {
    pub fn from_exchange(client: &ClientSecret, response: TokenResponse, now: DateTime<Utc>) -> Self {
        StoredToken {
            expiry: response.expiry_from(now),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_uri: client.token_uri.clone(),
            client_id: Some(client.client_id.clone()),
            client_secret: Some(client.client_secret.clone()),
            scopes: vec![DRIVE_SCOPE.to_string()],
        }
    }

    /// A token without an expiry is considered valid, matching Google's client libraries.
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - skew > now,
            None => true,
        }
    }

    /// Applies a refresh response. Google usually omits the refresh token on
    /// refresh, in which case the current one is kept.
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        StoredToken {
            expiry: response.expiry_from(now),
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            ..self.clone()
        }
    }

    pub fn credential(&self) -> Credential {
        Credential::new(
            self.access_token.clone(),
            self.refresh_token.clone(),
            self.expiry,
        )
    }
}

/// Returns `Ok(None)` when no token has been stored yet.
pub fn load(path: &Path) -> Result<Option<StoredToken>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let token = serde_json::from_str(&content)?;
    Ok(Some(token))
}

pub fn save(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(&serde_json::to_vec_pretty(token)?)?;
    file.sync_all()?;
    tracing::debug!("Token written to {}", path.display());
    Ok(())
}
