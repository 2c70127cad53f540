//! Google credential acquisition.
//!
//! Three interchangeable strategies, chosen once at startup (see
//! [`CredentialStrategy`]). Whatever the strategy, the result is a
//! [`Credential`] that the Drive client uses as a bearer token.

pub(crate) mod oauth;
pub(crate) mod service_account;
pub(crate) mod token_store;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Secret;
use crate::errors::{AppError, Result};
use oauth::ClientSecret;
use service_account::ServiceAccountKey;
use token_store::StoredToken;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    refresh_token: Option<String>,
    expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Credential {
            access_token: access_token.into(),
            refresh_token,
            expiry,
        }
    }

    pub fn bearer(&self) -> &str {
        &self.access_token
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum CredentialStrategy {
    /// Persisted user token, refreshed when expired. Falls back to the
    /// interactive flow when a client secret is available.
    StoredToken {
        token_path: PathBuf,
        client_secret: Option<Secret>,
    },
    /// Operator consent in the console; the resulting token is persisted.
    Interactive {
        token_path: PathBuf,
        client_secret: Secret,
    },
    /// Key-derived token, minted every run and never persisted.
    ServiceAccount { key: Secret },
}

impl CredentialStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            CredentialStrategy::StoredToken { .. } => "stored-token",
            CredentialStrategy::Interactive { .. } => "interactive",
            CredentialStrategy::ServiceAccount { .. } => "service-account",
        }
    }
}

/// Successful response of Google's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// An `expires_in` too large to represent yields `now`, so the token is
    /// refreshed on the next run.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| {
            Duration::try_seconds(secs)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .unwrap_or(now)
        })
    }
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, token: &StoredToken) -> Result<TokenResponse>;

    async fn exchange_code(&self, client: &ClientSecret, code: &str) -> Result<TokenResponse>;

    async fn exchange_assertion(&self, token_uri: &str, assertion: &str) -> Result<TokenResponse>;
}

/// Source of the authorization code the operator copies from the consent page.
pub trait CodePrompt: Send {
    fn authorization_code(&mut self, authorization_url: &str) -> Result<String>;
}

pub async fn obtain_credential(
    strategy: &CredentialStrategy,
    endpoint: &dyn TokenEndpoint,
    prompt: &mut dyn CodePrompt,
) -> Result<Credential> {
    obtain_credential_at(strategy, endpoint, prompt, Utc::now()).await
}

pub(crate) async fn obtain_credential_at(
    strategy: &CredentialStrategy,
    endpoint: &dyn TokenEndpoint,
    prompt: &mut dyn CodePrompt,
    now: DateTime<Utc>,
) -> Result<Credential> {
    tracing::info!(strategy = strategy.name(), "Authenticating with Google Drive");
    let credential = match strategy {
        CredentialStrategy::StoredToken {
            token_path,
            client_secret,
        } => stored_token_flow(token_path, client_secret.as_ref(), endpoint, prompt, now).await,
        CredentialStrategy::Interactive {
            token_path,
            client_secret,
        } => interactive_flow(token_path, client_secret, endpoint, prompt, now).await,
        CredentialStrategy::ServiceAccount { key } => {
            service_account_flow(key, endpoint, now).await
        }
    }?;
    tracing::debug!(
        refreshable = credential.has_refresh_token(),
        expiry = ?credential.expiry(),
        "Credential obtained"
    );
    Ok(credential)
}

async fn stored_token_flow(
    token_path: &Path,
    client_secret: Option<&Secret>,
    endpoint: &dyn TokenEndpoint,
    prompt: &mut dyn CodePrompt,
    now: DateTime<Utc>,
) -> Result<Credential> {
    match token_store::load(token_path) {
        Ok(Some(stored)) => {
            if stored.is_valid_at(now, Duration::seconds(EXPIRY_SKEW_SECS)) {
                tracing::info!("Using stored token from {}", token_path.display());
                return Ok(stored.credential());
            }
            if stored.refresh_token.is_some() {
                match endpoint.refresh(&stored).await {
                    Ok(response) => {
                        let refreshed = stored.refreshed(response, now);
                        if let Err(e) = token_store::save(token_path, &refreshed) {
                            tracing::warn!(
                                "Refreshed token could not be persisted to {}: {}",
                                token_path.display(),
                                e
                            );
                        }
                        tracing::info!("Stored token refreshed");
                        return Ok(refreshed.credential());
                    }
                    Err(e) => tracing::warn!("Refreshing the stored token failed: {}", e),
                }
            } else {
                tracing::info!("Stored token expired and carries no refresh token");
            }
        }
        Ok(None) => tracing::info!("No stored token at {}", token_path.display()),
        Err(e) => tracing::warn!("Stored token at {} is unusable: {}", token_path.display(), e),
    }

    match client_secret {
        Some(secret) => interactive_flow(token_path, secret, endpoint, prompt, now).await,
        None => Err(AppError::Auth(
            "no usable stored token and no OAuth client secret for interactive consent".to_string(),
        )),
    }
}

async fn interactive_flow(
    token_path: &Path,
    client_secret: &Secret,
    endpoint: &dyn TokenEndpoint,
    prompt: &mut dyn CodePrompt,
    now: DateTime<Utc>,
) -> Result<Credential> {
    let client = ClientSecret::parse(client_secret.expose())?;
    let url = client.authorization_url(DRIVE_SCOPE)?;

    let code = prompt.authorization_code(url.as_str())?;
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::Auth("no authorization code entered".to_string()));
    }

    let response = endpoint.exchange_code(&client, code).await?;
    let token = StoredToken::from_exchange(&client, response, now);
    token_store::save(token_path, &token).map_err(|e| {
        AppError::Auth(format!(
            "failed to persist token to {}: {}",
            token_path.display(),
            e
        ))
    })?;
    tracing::info!("Authorization complete, token saved to {}", token_path.display());
    Ok(token.credential())
}

async fn service_account_flow(
    key: &Secret,
    endpoint: &dyn TokenEndpoint,
    now: DateTime<Utc>,
) -> Result<Credential> {
    let key = ServiceAccountKey::parse(key.expose())?;
    tracing::info!("Using service account {}", key.client_email);
    let assertion = key.assertion(DRIVE_SCOPE, now)?;
    let response = endpoint.exchange_assertion(&key.token_uri, &assertion).await?;
    Ok(Credential::new(
        response.access_token.clone(),
        None,
        response.expiry_from(now),
    ))
}
