// pg_drive_backup/src/auth/oauth.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::io::{Write, stdin, stdout};
use url::Url;

use super::token_store::StoredToken;
use super::{CodePrompt, DEFAULT_TOKEN_URI, TokenEndpoint, TokenResponse};
use crate::errors::{AppError, Result};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
/// Used when the client descriptor lists no redirect URI.
const FALLBACK_REDIRECT_URI: &str = "http://localhost";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// Google's client_secret.json wraps the descriptor in "installed" or "web".
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientSecret {
    pub fn parse(json: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)
            .map_err(|e| AppError::Auth(format!("malformed OAuth client secret: {}", e)))?;
        file.installed.or(file.web).ok_or_else(|| {
            AppError::Auth("OAuth client secret has neither an 'installed' nor a 'web' section".to_string())
        })
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(FALLBACK_REDIRECT_URI)
    }

    /// Consent URL asking for offline access so a refresh token is issued.
    pub fn authorization_url(&self, scope: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri()),
                ("response_type", "code"),
                ("scope", scope),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AppError::Auth(format!("invalid auth_uri {}: {}", self.auth_uri, e)))
    }
}

/// Token endpoint client for Google's OAuth 2.0 server.
pub struct GoogleOAuth {
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(http: reqwest::Client) -> Self {
        GoogleOAuth { http }
    }

    async fn post_form(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("token request to {} failed: {}", token_uri, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "token endpoint {} returned {}: {}",
                token_uri, status, body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::Auth(format!("unexpected token response from {}: {}", token_uri, e)))
    }
}

#[async_trait]
impl TokenEndpoint for GoogleOAuth {
    async fn refresh(&self, token: &StoredToken) -> Result<TokenResponse> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            token.refresh_token.as_deref(),
            token.client_id.as_deref(),
            token.client_secret.as_deref(),
        ) else {
            return Err(AppError::Auth(
                "stored token lacks refresh_token, client_id or client_secret".to_string(),
            ));
        };

        self.post_form(
            &token.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
        )
        .await
    }

    async fn exchange_code(&self, client: &ClientSecret, code: &str) -> Result<TokenResponse> {
        self.post_form(
            &client.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("redirect_uri", client.redirect_uri()),
            ],
        )
        .await
    }

    async fn exchange_assertion(&self, token_uri: &str, assertion: &str) -> Result<TokenResponse> {
        self.post_form(
            token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)],
        )
        .await
    }
}

/// Blocks on stdin for the code; the operator is expected to be present.
pub struct ConsolePrompt;

impl CodePrompt for ConsolePrompt {
    fn authorization_code(&mut self, authorization_url: &str) -> Result<String> {
        println!("Open the following URL in a browser and authorize access to Google Drive:");
        println!();
        println!("    {}", authorization_url);
        println!();
        println!("After approving, copy the `code` parameter from the redirect address.");
        print!("Enter the authorization code: ");
        stdout().flush()?;

        let mut input = String::new();
        stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }
}
