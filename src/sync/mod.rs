// dumpsync/src/sync/mod.rs
pub(crate) mod credentials;
pub(crate) mod drive;
pub(crate) mod logic;
pub(crate) mod remote;
pub(crate) mod s3_upload;

use std::time::Duration;
use tracing::info;

use crate::backup::artifact::BackupArtifact;
use crate::backup::catalog;
use crate::config::{AppConfig, DriveConfig, RemoteProvider};
use crate::errors::{AppError, Result};
use credentials::{AuthState, CredentialStore, OAuthClient};
use drive::DriveStore;
use logic::{RemoteSync, SyncReport, UploadOutcome};
use remote::RemoteStore;
use s3_upload::S3Store;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| AppError::Config(format!("could not build HTTP client: {}", e)))
}

fn drive_config(app_config: &AppConfig) -> Result<&DriveConfig> {
    match &app_config.remote.provider {
        RemoteProvider::GoogleDrive(drive) => Ok(drive),
        RemoteProvider::S3(_) => Err(AppError::Config(
            "remote authorization only applies to the google_drive provider".to_string(),
        )),
    }
}

pub fn credential_store(app_config: &AppConfig) -> CredentialStore {
    CredentialStore::new(&app_config.remote.token_path)
}

/// Opens the configured backend. For Drive the stored credential must load,
/// otherwise the run stops here with `CredentialMissing`.
async fn connect_store(app_config: &AppConfig) -> Result<Box<dyn RemoteStore>> {
    match &app_config.remote.provider {
        RemoteProvider::GoogleDrive(drive) => {
            let store = credential_store(app_config);
            let credential = store.load()?;
            let http = http_client()?;
            let credential = OAuthClient::new(drive, http.clone(), app_config.remote.request_timeout)
                .ensure_fresh(&store, credential)
                .await?;
            Ok(Box::new(DriveStore::new(drive, http, credential.access_token)))
        }
        RemoteProvider::S3(spaces) => Ok(Box::new(S3Store::connect(spaces).await)),
    }
}

/// Uploads every local artifact, skipping what the remote side already has.
pub async fn run_sync_all_flow(app_config: &AppConfig) -> Result<SyncReport> {
    let store = connect_store(app_config).await?;
    info!(store = store.name(), root = %app_config.backup_root().display(), "Starting full sync");
    let mut sync = RemoteSync::new(
        store.as_ref(),
        app_config.remote.root_folder.clone(),
        app_config.remote.request_timeout,
    );
    sync.sync_all(app_config.backup_root()).await
}

/// Uploads the artifact whose id (file name) is `artifact_id`.
pub async fn run_sync_one_flow(app_config: &AppConfig, artifact_id: &str) -> Result<(BackupArtifact, UploadOutcome)> {
    let store = connect_store(app_config).await?;
    let artifact = catalog::find_by_id(app_config.backup_root(), artifact_id)?;
    upload_one(app_config, store.as_ref(), artifact).await
}

/// Uploads the most recent artifact.
pub async fn run_sync_latest_flow(app_config: &AppConfig) -> Result<(BackupArtifact, UploadOutcome)> {
    let store = connect_store(app_config).await?;
    let artifact = catalog::find_latest(app_config.backup_root())?;
    upload_one(app_config, store.as_ref(), artifact).await
}

async fn upload_one(
    app_config: &AppConfig,
    store: &dyn RemoteStore,
    mut artifact: BackupArtifact,
) -> Result<(BackupArtifact, UploadOutcome)> {
    info!(store = store.name(), file = %artifact.name, "Uploading single backup");
    let mut sync = RemoteSync::new(
        store,
        app_config.remote.root_folder.clone(),
        app_config.remote.request_timeout,
    );
    let outcome = sync.sync_one(&artifact).await?;
    artifact.uploaded = true;
    Ok((artifact, outcome))
}

/// Whether a credential record loads. Expiry is not part of the answer.
pub fn auth_state(app_config: &AppConfig) -> AuthState {
    credential_store(app_config).state()
}

pub fn authorization_url(app_config: &AppConfig) -> Result<String> {
    let drive = drive_config(app_config)?;
    OAuthClient::new(drive, http_client()?, app_config.remote.request_timeout).authorization_url()
}

/// Exchanges an authorization code and stores the resulting credential.
pub async fn run_authorize_flow(app_config: &AppConfig, code: &str) -> Result<()> {
    let drive = drive_config(app_config)?;
    let store = credential_store(app_config);
    OAuthClient::new(drive, http_client()?, app_config.remote.request_timeout)
        .exchange_code(&store, code)
        .await?;
    Ok(())
}
