// dumpsync/src/backup/catalog.rs
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::artifact::BackupArtifact;
use crate::errors::{AppError, Result};

pub const EXPORT_EXTENSION: &str = "sql";

/// A calendar-day directory under the backup root and the exports inside it.
#[derive(Debug, Clone)]
pub struct DateBucket {
    pub name: String,
    pub artifacts: Vec<BackupArtifact>,
}

/// Enumerates every date bucket under `root`.
///
/// Order follows the filesystem. Buckets or files that cannot be read are
/// skipped; only an unreadable root is an error.
pub fn list_buckets(root: &Path) -> Result<Vec<DateBucket>> {
    let entries = fs::read_dir(root).map_err(|source| AppError::CatalogReadFailed {
        path: root.to_path_buf(),
        source,
    })?;

    let mut buckets = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry in backup root");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let artifacts = scan_bucket(&path, &name);
        buckets.push(DateBucket { name, artifacts });
    }
    Ok(buckets)
}

fn scan_bucket(bucket_path: &Path, bucket_name: &str) -> Vec<BackupArtifact> {
    let mut artifacts = Vec::new();
    for entry in WalkDir::new(bucket_path).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(bucket = bucket_name, error = %e, "Skipping unreadable bucket entry");
                continue;
            }
        };
        if !is_export_file(entry.path()) {
            continue;
        }
        // Follows symlinks, so a dangling link lands in the error arm.
        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                warn!(file = %entry.path().display(), error = %e, "Skipping file that cannot be stat'ed");
                continue;
            }
        };
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(file = %entry.path().display(), error = %e, "Skipping file without modification time");
                continue;
            }
        };

        let file_name = entry.file_name().to_string_lossy().to_string();
        artifacts.push(BackupArtifact {
            id: file_name.clone(),
            name: file_name,
            path: entry.path().to_path_buf(),
            bucket: bucket_name.to_string(),
            size_bytes: metadata.len(),
            created_at: DateTime::<Local>::from(modified),
            uploaded: false,
        });
    }
    debug!(bucket = bucket_name, count = artifacts.len(), "Scanned date bucket");
    artifacts
}

fn is_export_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(EXPORT_EXTENSION)
}

/// Every artifact under `root`. Order is not guaranteed; sort if it matters.
pub fn list_all(root: &Path) -> Result<Vec<BackupArtifact>> {
    Ok(list_buckets(root)?
        .into_iter()
        .flat_map(|bucket| bucket.artifacts)
        .collect())
}

/// The artifact with the greatest `created_at`.
///
/// On equal timestamps the first one enumerated wins, which depends on the
/// filesystem's directory order.
pub fn find_latest(root: &Path) -> Result<BackupArtifact> {
    let mut latest: Option<BackupArtifact> = None;
    for artifact in list_all(root)? {
        match &latest {
            Some(current) if artifact.created_at <= current.created_at => {}
            _ => latest = Some(artifact),
        }
    }
    latest.ok_or_else(|| AppError::NoBackupsFound(root.to_path_buf()))
}

pub fn find_by_id(root: &Path, id: &str) -> Result<BackupArtifact> {
    list_all(root)?
        .into_iter()
        .find(|artifact| artifact.id == id)
        .ok_or_else(|| AppError::ArtifactNotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn place(root: &Path, bucket: &str, file: &str, contents: &[u8]) -> anyhow::Result<PathBuf> {
        let dir = root.join(bucket);
        fs::create_dir_all(&dir)?;
        let path = dir.join(file);
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn set_mtime(path: &Path, secs: u64) -> anyhow::Result<()> {
        let file = File::options().write(true).open(path)?;
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))?;
        Ok(())
    }

    #[test]
    fn test_list_all_returns_every_placed_file_once() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let placed = [
            ("2024-01-01", "shop_20240101_010000.sql"),
            ("2024-01-01", "shop_20240101_020000.sql"),
            ("2024-01-02", "shop_20240102_010000.sql"),
            ("2024-01-03", "shop_20240103_010000.sql"),
            ("2024-01-03", "shop_20240103_230000.sql"),
        ];
        for (bucket, file) in placed {
            place(root.path(), bucket, file, b"INSERT INTO t VALUES (1);")?;
        }

        let mut names: Vec<String> = list_all(root.path())?.into_iter().map(|a| a.id).collect();
        names.sort();
        let mut expected: Vec<String> = placed.iter().map(|(_, f)| f.to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);
        Ok(())
    }

    #[test]
    fn test_artifact_fields_come_from_the_file() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let path = place(root.path(), "2024-02-10", "shop_20240210_080000.sql", b"0123456789")?;
        set_mtime(&path, 1_700_000_000)?;

        let artifacts = list_all(root.path())?;
        assert_eq!(artifacts.len(), 1);
        let artifact = &artifacts[0];
        assert_eq!(artifact.id, "shop_20240210_080000.sql");
        assert_eq!(artifact.name, artifact.id);
        assert_eq!(artifact.bucket, "2024-02-10");
        assert_eq!(artifact.path, path);
        assert_eq!(artifact.size_bytes, 10);
        assert_eq!(artifact.created_at.timestamp(), 1_700_000_000);
        assert!(!artifact.uploaded);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unstatable_entry_is_skipped_not_fatal() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        place(root.path(), "2024-01-01", "shop_20240101_010000.sql", b"x")?;
        std::os::unix::fs::symlink(
            root.path().join("does-not-exist.sql"),
            root.path().join("2024-01-01").join("x.sql"),
        )?;

        let artifacts = list_all(root.path())?;
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].id, "shop_20240101_010000.sql");
        Ok(())
    }

    #[test]
    fn test_non_export_files_and_loose_files_are_ignored() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        place(root.path(), "2024-01-01", "shop_20240101_010000.sql", b"x")?;
        place(root.path(), "2024-01-01", "notes.txt", b"x")?;
        fs::write(root.path().join("stray.sql"), b"x")?;
        fs::create_dir_all(root.path().join("2024-01-01").join("nested.sql"))?;

        let artifacts = list_all(root.path())?;
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].id, "shop_20240101_010000.sql");
        Ok(())
    }

    #[test]
    fn test_find_latest_picks_greatest_created_at() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let a = place(root.path(), "2024-01-01", "a.sql", b"a")?;
        let b = place(root.path(), "2024-01-02", "b.sql", b"b")?;
        let c = place(root.path(), "2024-01-03", "c.sql", b"c")?;
        set_mtime(&a, 10)?;
        set_mtime(&b, 30)?;
        set_mtime(&c, 20)?;

        let latest = find_latest(root.path())?;
        assert_eq!(latest.id, "b.sql");
        Ok(())
    }

    #[test]
    fn test_find_latest_on_empty_root_reports_no_backups() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join("2024-01-01"))?;
        match find_latest(root.path()) {
            Err(AppError::NoBackupsFound(path)) => assert_eq!(path, root.path()),
            other => panic!("expected NoBackupsFound, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_missing_root_is_a_read_failure() {
        let root = PathBuf::from("/nonexistent/dumpsync/backups");
        assert!(matches!(list_all(&root), Err(AppError::CatalogReadFailed { .. })));
    }

    #[test]
    fn test_find_by_id() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        place(root.path(), "2024-01-01", "shop_20240101_010000.sql", b"x")?;

        let found = find_by_id(root.path(), "shop_20240101_010000.sql")?;
        assert_eq!(found.bucket, "2024-01-01");
        assert!(matches!(
            find_by_id(root.path(), "missing.sql"),
            Err(AppError::ArtifactNotFound(id)) if id == "missing.sql"
        ));
        Ok(())
    }
}
