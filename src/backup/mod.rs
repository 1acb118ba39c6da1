pub(crate) mod artifact;
pub(crate) mod catalog;
pub(crate) mod db_dump;

use crate::config::AppConfig;
use crate::errors::Result;
use artifact::BackupArtifact;
use db_dump::Exporter;

/// Public entry point for a single export.
pub async fn run_capture_flow(app_config: &AppConfig) -> Result<BackupArtifact> {
    Exporter::new().capture(&app_config.export).await
}

/// Every local artifact, newest first.
pub fn run_list_flow(app_config: &AppConfig) -> Result<Vec<BackupArtifact>> {
    let mut artifacts = catalog::list_all(app_config.backup_root())?;
    artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(artifacts)
}
