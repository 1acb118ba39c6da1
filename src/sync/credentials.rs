// dumpsync/src/sync/credentials.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DriveConfig;
use crate::errors::{AppError, Result};

pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const OAUTH_STATE: &str = "state-token";

/// Bearer token set used for remote API calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// A missing or zero expiry never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) if expiry.timestamp() > 0 => expiry <= now,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

/// Persists the single credential record as JSON.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites any previous record.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let save_error = |reason: String| {
            AppError::CredentialExchangeFailed(format!(
                "could not save credential to {}: {}",
                self.path.display(),
                reason
            ))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| save_error(e.to_string()))?;
            restrict_permissions(parent, 0o700);
        }
        let json = serde_json::to_vec_pretty(credential).map_err(|e| save_error(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| save_error(e.to_string()))?;
        restrict_permissions(&self.path, 0o600);
        debug!(path = %self.path.display(), "Credential saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Credential> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            AppError::CredentialMissing(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::CredentialMissing(format!("{} is not a valid credential: {}", self.path.display(), e))
        })
    }

    /// Authenticated iff a record loads and parses. Expiry is not consulted,
    /// so a stale token still counts as authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.load().is_ok()
    }

    pub fn state(&self) -> AuthState {
        if self.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        warn!(path = %path.display(), error = %e, "Could not restrict permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) {}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_credential(self, now: DateTime<Utc>, previous_refresh_token: Option<&str>) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh_token.map(str::to_string))
                .unwrap_or_default(),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + ChronoDuration::seconds(secs)),
        }
    }
}

/// Authorization-code flow against the Drive OAuth endpoints.
pub struct OAuthClient<'a> {
    config: &'a DriveConfig,
    http: reqwest::Client,
    timeout: Duration,
}

impl<'a> OAuthClient<'a> {
    pub fn new(config: &'a DriveConfig, http: reqwest::Client, timeout: Duration) -> Self {
        Self { config, http, timeout }
    }

    /// URL the user opens to grant offline access.
    pub fn authorization_url(&self) -> Result<String> {
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", DRIVE_FILE_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", OAUTH_STATE),
            ],
        )
        .map_err(|e| AppError::Config(format!("invalid OAuth auth_url '{}': {}", self.config.auth_url, e)))?;
        Ok(url.to_string())
    }

    /// Trades an authorization code for a credential and persists it.
    pub async fn exchange_code(&self, store: &CredentialStore, code: &str) -> Result<Credential> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::CredentialExchangeFailed("authorization code is empty".to_string()));
        }
        let credential = self
            .request_token(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("redirect_uri", self.config.redirect_url.as_str()),
                ],
                None,
            )
            .await?;
        store.save(&credential)?;
        info!(path = %store.path().display(), "✓ Remote access authorized");
        Ok(credential)
    }

    /// Returns `credential` untouched unless its access token has expired and
    /// a refresh token is available; a refreshed record is persisted.
    pub async fn ensure_fresh(&self, store: &CredentialStore, credential: Credential) -> Result<Credential> {
        if !credential.is_expired(Utc::now()) || credential.refresh_token.is_empty() {
            return Ok(credential);
        }
        info!("Access token expired, refreshing");
        let refreshed = self
            .request_token(
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", credential.refresh_token.as_str()),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                ],
                Some(&credential.refresh_token),
            )
            .await?;
        store.save(&refreshed)?;
        Ok(refreshed)
    }

    async fn request_token(&self, form: &[(&str, &str)], previous_refresh_token: Option<&str>) -> Result<Credential> {
        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(self.timeout)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::CredentialExchangeFailed(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CredentialExchangeFailed(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::CredentialExchangeFailed(format!("could not parse token response: {}", e))
        })?;
        Ok(token.into_credential(Utc::now(), previous_refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_credential() -> Credential {
        Credential {
            access_token: "ya29.access".to_string(),
            refresh_token: "1//refresh".to_string(),
            token_type: "Bearer".to_string(),
            expiry: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }
    }

    fn drive_config() -> DriveConfig {
        DriveConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "http://localhost:8080/callback".to_string(),
            api_base_url: crate::config::DEFAULT_DRIVE_API_URL.to_string(),
            upload_base_url: crate::config::DEFAULT_DRIVE_UPLOAD_URL.to_string(),
            auth_url: crate::config::DEFAULT_OAUTH_AUTH_URL.to_string(),
            token_url: crate::config::DEFAULT_OAUTH_TOKEN_URL.to_string(),
        }
    }

    #[test]
    fn test_save_then_load_round_trips_every_field() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path().join("token").join("token.json"));
        let credential = sample_credential();

        store.save(&credential)?;
        assert_eq!(store.load()?, credential);
        Ok(())
    }

    #[test]
    fn test_save_overwrites_previous_record() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path().join("token.json"));
        store.save(&sample_credential())?;

        let mut newer = sample_credential();
        newer.access_token = "ya29.newer".to_string();
        store.save(&newer)?;
        assert_eq!(store.load()?.access_token, "ya29.newer");
        Ok(())
    }

    #[test]
    fn test_persisted_field_names() -> anyhow::Result<()> {
        let value = serde_json::to_value(sample_credential())?;
        assert_eq!(value["access_token"], "ya29.access");
        assert_eq!(value["refresh_token"], "1//refresh");
        assert_eq!(value["token_type"], "Bearer");
        assert_eq!(value["expiry"], "2024-05-01T12:00:00Z");
        Ok(())
    }

    #[test]
    fn test_missing_record_is_unauthenticated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path().join("token.json"));
        assert_eq!(store.state(), AuthState::Unauthenticated);
        assert!(matches!(store.load(), Err(AppError::CredentialMissing(_))));
        Ok(())
    }

    #[test]
    fn test_corrupt_record_is_unauthenticated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("token.json");
        fs::write(&path, b"{ not json")?;
        assert!(!CredentialStore::new(path).is_authenticated());
        Ok(())
    }

    #[test]
    fn test_expired_record_still_counts_as_authenticated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path().join("token.json"));
        let mut stale = sample_credential();
        stale.expiry = Some(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
        store.save(&stale)?;

        assert!(stale.is_expired(Utc::now()));
        assert!(store.is_authenticated());
        Ok(())
    }

    #[test]
    fn test_record_without_optional_fields_loads() -> anyhow::Result<()> {
        let credential: Credential = serde_json::from_str(r#"{"access_token":"abc"}"#)?;
        assert_eq!(credential.refresh_token, "");
        assert_eq!(credential.expiry, None);
        assert!(!credential.is_expired(Utc::now()));
        Ok(())
    }

    #[test]
    fn test_token_response_keeps_previous_refresh_token() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let response = TokenResponse {
            access_token: "fresh".to_string(),
            refresh_token: None,
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3599),
        };
        let credential = response.into_credential(now, Some("1//keep"));
        assert_eq!(credential.refresh_token, "1//keep");
        assert_eq!(credential.expiry, Some(now + ChronoDuration::seconds(3599)));
    }

    #[test]
    fn test_authorization_url_requests_offline_consent() -> anyhow::Result<()> {
        let config = drive_config();
        let oauth = OAuthClient::new(&config, reqwest::Client::new(), Duration::from_secs(5));
        let url = Url::parse(&oauth.authorization_url()?)?;

        assert!(url.as_str().starts_with(crate::config::DEFAULT_OAUTH_AUTH_URL));
        let params: std::collections::HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(params["scope"], DRIVE_FILE_SCOPE);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["response_type"], "code");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected_without_network() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path().join("token.json"));
        let config = drive_config();
        let oauth = OAuthClient::new(&config, reqwest::Client::new(), Duration::from_secs(5));

        let result = oauth.exchange_code(&store, "  ").await;
        assert!(matches!(result, Err(AppError::CredentialExchangeFailed(_))));
        assert!(!store.is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_credential_is_not_refreshed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = CredentialStore::new(dir.path().join("token.json"));
        let config = drive_config();
        let oauth = OAuthClient::new(&config, reqwest::Client::new(), Duration::from_secs(5));
        let mut credential = sample_credential();
        credential.expiry = Some(Utc::now() + ChronoDuration::hours(1));

        let result = oauth.ensure_fresh(&store, credential.clone()).await?;
        assert_eq!(result, credential);
        Ok(())
    }
}
