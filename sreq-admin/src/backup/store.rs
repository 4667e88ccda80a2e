//! On-disk backup file store
//!
//! All backup documents live in one directory. Caller-supplied filenames
//! are untrusted: they must name a single entry directly inside that
//! directory and may not escape it through `..`, separators, absolute paths
//! or symlinks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::document::BackupDocument;

/// Backup store errors
#[derive(Debug, Error)]
pub enum BackupStoreError {
    /// Filename empty or escaping the backup directory
    #[error("Invalid backup filename: {0}")]
    InvalidFilename(String),

    /// File missing, unreadable or not valid JSON
    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Listing entry for one backup file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFileInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Backup directory handle
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the backup directory if missing
    pub fn ensure_dir(&self) -> Result<(), BackupStoreError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Resolve an untrusted filename to a path inside the backup directory
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, BackupStoreError> {
        let trimmed = filename.trim();
        if trimmed.is_empty() {
            return Err(BackupStoreError::InvalidFilename(
                "filename is empty".to_string(),
            ));
        }

        if trimmed.contains('/') || trimmed.contains('\\') {
            return Err(BackupStoreError::InvalidFilename(format!(
                "'{}' must not contain path separators",
                trimmed
            )));
        }

        let mut components = Path::new(trimmed).components();
        let name = match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => name,
            _ => {
                return Err(BackupStoreError::InvalidFilename(format!(
                    "'{}' is not a plain file name",
                    trimmed
                )))
            }
        };

        let path = self.dir.join(name);

        // Symlinks may still point outside the directory
        if path.exists() {
            let canonical_dir = self.dir.canonicalize()?;
            let canonical = path.canonicalize()?;
            if !canonical.starts_with(&canonical_dir) {
                return Err(BackupStoreError::InvalidFilename(format!(
                    "'{}' resolves outside the backup directory",
                    trimmed
                )));
            }
        }

        Ok(path)
    }

    /// Read and parse a backup file as raw JSON
    ///
    /// Shape validation is left to [`BackupDocument::from_value`].
    pub fn load(&self, filename: &str) -> Result<Value, BackupStoreError> {
        let path = self.resolve(filename)?;

        let content = std::fs::read_to_string(&path).map_err(|e| {
            debug!(path = %path.display(), error = %e, "Backup file unreadable");
            BackupStoreError::NotFound(format!("{}: {}", filename.trim(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            BackupStoreError::NotFound(format!("{} is not valid JSON: {}", filename.trim(), e))
        })
    }

    /// List `.json` backup files, newest first
    pub fn list(&self) -> Result<Vec<BackupFileInfo>, BackupStoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            files.push(BackupFileInfo {
                filename: entry.file_name().to_string_lossy().to_string(),
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        Ok(files)
    }

    /// Write a document as `backup-<YYYYMMDD-HHMMSS>.json`
    ///
    /// Written to a temporary file first and renamed into place.
    pub fn save(&self, document: &BackupDocument) -> Result<String, BackupStoreError> {
        self.ensure_dir()?;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let mut filename = format!("backup-{}.json", stamp);
        let mut suffix = 1;
        while self.dir.join(&filename).exists() {
            filename = format!("backup-{}-{}.json", stamp, suffix);
            suffix += 1;
        }

        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!(".{}.tmp", filename));

        let content = serde_json::to_vec_pretty(document)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;

        info!(path = %path.display(), "Backup written");
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::document::BackupMetadata;
    use serde_json::Map;

    fn store() -> (tempfile::TempDir, BackupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_resolve_plain_name() {
        let (dir, store) = store();
        let path = store.resolve("backup.json").unwrap();
        assert_eq!(path, dir.path().join("backup.json"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let (_dir, store) = store();

        for name in [
            "",
            "   ",
            "..",
            ".",
            "../etc/passwd",
            "sub/backup.json",
            "/etc/passwd",
            "..\\windows\\system.ini",
        ] {
            assert!(
                matches!(store.resolve(name), Err(BackupStoreError::InvalidFilename(_))),
                "'{}' should be rejected",
                name
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let (dir, store) = store();
        let outside = tempfile::NamedTempFile::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link.json")).unwrap();

        assert!(matches!(
            store.resolve("link.json"),
            Err(BackupStoreError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("missing.json"),
            Err(BackupStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_invalid_json_is_not_found() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        assert!(matches!(
            store.load("broken.json"),
            Err(BackupStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_save_then_list_and_load() {
        let (_dir, store) = store();
        let document = BackupDocument {
            metadata: BackupMetadata {
                version: "1.0".to_string(),
                creator: "alice".to_string(),
                ..Default::default()
            },
            data: Map::new(),
        };

        let first = store.save(&document).unwrap();
        let second = store.save(&document).unwrap();
        assert_ne!(first, second, "Same-second saves must not overwrite");
        assert!(first.starts_with("backup-") && first.ends_with(".json"));

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|f| f.size_bytes > 0));

        let loaded = store.load(&first).unwrap();
        assert_eq!(loaded["metadata"]["creator"], "alice");
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let store = BackupStore::new("/nonexistent/sreq/backups");
        assert!(store.list().unwrap().is_empty());
    }
}
