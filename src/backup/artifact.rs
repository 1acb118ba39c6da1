// dumpsync/src/backup/artifact.rs
use chrono::{DateTime, Local};
use std::path::PathBuf;

/// One completed database export on local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    /// File name, unique within the catalog.
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    /// Date bucket (`YYYY-MM-DD`) the file lives in.
    pub bucket: String,
    pub size_bytes: u64,
    /// Modification time of the file.
    pub created_at: DateTime<Local>,
    /// Advisory only, never persisted.
    pub uploaded: bool,
}

impl BackupArtifact {
    pub fn format_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;
        const GB: u64 = 1024 * MB;

        let size = self.size_bytes as f64;
        match self.size_bytes {
            s if s >= GB => format!("{:.2} GB", size / GB as f64),
            s if s >= MB => format!("{:.2} MB", size / MB as f64),
            s if s >= KB => format!("{:.2} KB", size / KB as f64),
            s => format!("{} B", s),
        }
    }

    pub fn format_created_at(&self) -> String {
        self.created_at.format("%d/%m/%Y %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn artifact_of_size(size_bytes: u64) -> BackupArtifact {
        BackupArtifact {
            id: "shop_20240105_030000.sql".to_string(),
            name: "shop_20240105_030000.sql".to_string(),
            path: PathBuf::from("/backups/2024-01-05/shop_20240105_030000.sql"),
            bucket: "2024-01-05".to_string(),
            size_bytes,
            created_at: Local.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap(),
            uploaded: false,
        }
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(artifact_of_size(512).format_size(), "512 B");
        assert_eq!(artifact_of_size(1536).format_size(), "1.50 KB");
        assert_eq!(artifact_of_size(5 * 1024 * 1024).format_size(), "5.00 MB");
        assert_eq!(artifact_of_size(3 * 1024 * 1024 * 1024).format_size(), "3.00 GB");
    }

    #[test]
    fn test_format_created_at() {
        assert_eq!(artifact_of_size(1).format_created_at(), "05/01/2024 03:00:00");
    }
}
