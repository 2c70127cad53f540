mod logic;
pub(crate) mod archive; // tar.gz creation
pub(crate) mod db_dump; // pg_dump invocation

use async_trait::async_trait;
use std::time::Duration;

use crate::auth::oauth::{ConsolePrompt, GoogleOAuth};
use crate::auth::{self, CredentialStrategy};
use crate::config::AppConfig;
use crate::drive::RemoteStore;
use crate::drive::client::DriveClient;
use crate::errors::Result;
pub use logic::{BackupReport, StoreConnector};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Production connector: Google OAuth for the credential, Drive v3 for storage.
pub struct GoogleDriveConnector {
    http: reqwest::Client,
}

impl GoogleDriveConnector {
    pub fn new() -> Result<Self> {
        // Drive answers resumable chunks with 308 and no Location; never follow it.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(GoogleDriveConnector { http })
    }
}

#[async_trait]
impl StoreConnector for GoogleDriveConnector {
    async fn connect(&self, strategy: &CredentialStrategy) -> Result<Box<dyn RemoteStore>> {
        let endpoint = GoogleOAuth::new(self.http.clone());
        let mut prompt = ConsolePrompt;
        let credential = auth::obtain_credential(strategy, &endpoint, &mut prompt).await?;
        Ok(Box::new(DriveClient::new(self.http.clone(), credential)))
    }
}

/// Public entry point for the backup process.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<BackupReport> {
    tracing::info!(
        database = %app_config.database.name,
        host = %app_config.database.host,
        folder = %app_config.drive.folder_name,
        "Starting backup"
    );
    let connector = GoogleDriveConnector::new()?;
    logic::perform_backup_orchestration(app_config, &connector).await
}
