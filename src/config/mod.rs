// dumpsync/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BACKUP_DIR: &str = "./backups";
const DEFAULT_TOKEN_PATH: &str = "./token/token.json";
const DEFAULT_PG_PORT: u16 = 5432;
const DEFAULT_EXPORT_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 900;

pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DEFAULT_OAUTH_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDatabaseConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub container_name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDriveConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_url: Option<String>,
    pub api_base_url: Option<String>,
    pub upload_base_url: Option<String>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRemoteConfig {
    pub provider: Option<String>,
    pub root_folder: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub google_drive: Option<JsonDriveConfig>,
    pub s3_storage: Option<JsonS3StorageConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub database: Option<JsonDatabaseConfig>,
    pub local_backup_dir: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub export_timeout_secs: Option<u64>,
    pub remote: Option<JsonRemoteConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpTarget {
    /// `pg_dump` runs inside this container through `docker exec`.
    Container(String),
    /// `pg_dump` runs locally against a reachable server.
    Host { host: String, port: u16 },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub target: DumpTarget,
    pub user: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub database: DatabaseConfig,
    pub backup_root: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub api_base_url: String,
    pub upload_base_url: String,
    pub auth_url: String,
    pub token_url: String,
}

#[derive(Debug, Clone)]
pub struct SpacesConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

#[derive(Debug, Clone)]
pub enum RemoteProvider {
    GoogleDrive(DriveConfig),
    S3(SpacesConfig),
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub provider: RemoteProvider,
    pub root_folder: String,
    pub request_timeout: Duration,
    pub token_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub export: ExportConfig,
    pub remote: RemoteConfig,
}

impl AppConfig {
    pub fn backup_root(&self) -> &Path {
        &self.export.backup_root
    }

    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let mut raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        apply_env_overrides(&mut raw_json_config, |key| env::var(key).ok());
        Self::from_raw(&raw_json_config)
    }

    pub fn from_raw(raw_config: &RawJsonConfig) -> Result<Self> {
        Ok(AppConfig {
            export: load_export_config(raw_config)?,
            remote: load_remote_config(raw_config)?,
        })
    }
}

/// Secrets kept in the environment (or `.env`) win over the file.
pub fn apply_env_overrides<F>(raw_config: &mut RawJsonConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(password) = non_empty("DB_PASSWORD") {
        raw_config.database.get_or_insert_with(Default::default).password = Some(password);
    }

    let remote = raw_config.remote.get_or_insert_with(Default::default);
    if let Some(client_id) = non_empty("GOOGLE_CLIENT_ID") {
        remote.google_drive.get_or_insert_with(Default::default).client_id = Some(client_id);
    }
    if let Some(client_secret) = non_empty("GOOGLE_CLIENT_SECRET") {
        remote.google_drive.get_or_insert_with(Default::default).client_secret = Some(client_secret);
    }
    if let Some(key_id) = non_empty("S3_ACCESS_KEY_ID") {
        remote.s3_storage.get_or_insert_with(Default::default).access_key_id = Some(key_id);
    }
    if let Some(secret) = non_empty("S3_SECRET_ACCESS_KEY") {
        remote.s3_storage.get_or_insert_with(Default::default).secret_access_key = Some(secret);
    }
}

pub fn load_export_config(raw_config: &RawJsonConfig) -> Result<ExportConfig> {
    let db = raw_config
        .database
        .as_ref()
        .context("database section must be set in config.json")?;

    let user = required(&db.user, "database.user")?;
    let password = required(&db.password, "database.password")?;
    let name = required(&db.name, "database.name")?;
    validate_database_name(&name)?;

    let container = db.container_name.clone().filter(|s| !s.trim().is_empty());
    let host = db.host.clone().filter(|s| !s.trim().is_empty());
    let target = match (container, host) {
        (Some(container), None) => DumpTarget::Container(container),
        (None, Some(host)) => DumpTarget::Host {
            host,
            port: db.port.unwrap_or(DEFAULT_PG_PORT),
        },
        (Some(_), Some(_)) => {
            anyhow::bail!("database.container_name and database.host are mutually exclusive in config.json")
        }
        (None, None) => {
            anyhow::bail!("one of database.container_name or database.host must be set in config.json")
        }
    };

    let backup_root = raw_config
        .local_backup_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
    if backup_root.to_string_lossy().is_empty() {
        return Err(anyhow::anyhow!("local_backup_dir cannot be empty in config.json."));
    }

    Ok(ExportConfig {
        database: DatabaseConfig { target, user, password, name },
        backup_root,
        timeout: positive_timeout(
            raw_config.export_timeout_secs.unwrap_or(DEFAULT_EXPORT_TIMEOUT_SECS),
            "export_timeout_secs",
        )?,
    })
}

pub fn load_remote_config(raw_config: &RawJsonConfig) -> Result<RemoteConfig> {
    let remote = raw_config
        .remote
        .as_ref()
        .context("remote section must be set in config.json")?;

    let root_folder = required(&remote.root_folder, "remote.root_folder")?;
    let provider = match remote.provider.as_deref().unwrap_or("google_drive") {
        "google_drive" | "drive" => RemoteProvider::GoogleDrive(load_drive_config(remote)?),
        "s3" | "spaces" => RemoteProvider::S3(load_spaces_config(remote)?),
        other => anyhow::bail!(
            "remote.provider must be 'google_drive' or 's3' in config.json, got '{}'",
            other
        ),
    };

    Ok(RemoteConfig {
        provider,
        root_folder,
        request_timeout: positive_timeout(
            remote.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            "remote.request_timeout_secs",
        )?,
        token_path: raw_config
            .token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH)),
    })
}

fn load_drive_config(remote: &JsonRemoteConfig) -> Result<DriveConfig> {
    let drive = remote
        .google_drive
        .as_ref()
        .context("remote.google_drive must be set in config.json for the google_drive provider")?;

    let or_default = |value: &Option<String>, default: &str| {
        value
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    };

    Ok(DriveConfig {
        client_id: required(&drive.client_id, "remote.google_drive.client_id")?,
        client_secret: required(&drive.client_secret, "remote.google_drive.client_secret")?,
        redirect_url: required(&drive.redirect_url, "remote.google_drive.redirect_url")?,
        api_base_url: or_default(&drive.api_base_url, DEFAULT_DRIVE_API_URL),
        upload_base_url: or_default(&drive.upload_base_url, DEFAULT_DRIVE_UPLOAD_URL),
        auth_url: or_default(&drive.auth_url, DEFAULT_OAUTH_AUTH_URL),
        token_url: or_default(&drive.token_url, DEFAULT_OAUTH_TOKEN_URL),
    })
}

fn load_spaces_config(remote: &JsonRemoteConfig) -> Result<SpacesConfig> {
    let s3_raw = remote
        .s3_storage
        .as_ref()
        .context("remote.s3_storage must be set in config.json for the s3 provider")?;

    Ok(SpacesConfig {
        bucket_name: required(&s3_raw.bucket_name, "remote.s3_storage.bucket_name")?,
        region: required(&s3_raw.region, "remote.s3_storage.region")?,
        access_key_id: required(&s3_raw.access_key_id, "remote.s3_storage.access_key_id")?,
        secret_access_key: required(&s3_raw.secret_access_key, "remote.s3_storage.secret_access_key")?,
        endpoint_url: required(&s3_raw.endpoint_url, "remote.s3_storage.endpoint_url")?,
    })
}

fn positive_timeout(secs: u64, key: &str) -> Result<Duration> {
    if secs == 0 {
        anyhow::bail!("{} must be greater than 0 in config.json", key);
    }
    Ok(Duration::from_secs(secs))
}

fn required(value: &Option<String>, key: &str) -> Result<String> {
    value
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .with_context(|| format!("{} must be set in config.json", key))
}

/// Database names end up in file names and in the dump command line.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.trim().is_empty()
        || name.contains(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
    {
        return Err(anyhow::anyhow!(
            "Invalid database name '{}': only letters, digits, '_' and '-' are allowed",
            name
        ));
    }
    Ok(())
}
