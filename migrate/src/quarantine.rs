//! Failure sink: copies failed files aside and keeps an error log

use std::path::{Path, PathBuf};
use chrono::Utc;
use filetime::FileTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::reader::sanitize_path;

/// Default quarantine directory name under the migration root
pub const DEFAULT_ERROR_DIR: &str = "migration_errors";
const FILES_DIR: &str = "files";
const ERROR_LOG: &str = "error_log.txt";
const ENTRY_SEPARATOR_WIDTH: usize = 60;

/// Quarantine area for files that failed to migrate
#[derive(Debug, Clone)]
pub struct Quarantine {
    error_dir: PathBuf,
}

impl Quarantine {
    pub fn new(error_dir: impl Into<PathBuf>) -> Self {
        Self {
            error_dir: error_dir.into(),
        }
    }

    /// Quarantine rooted at `<root>/migration_errors`
    pub fn for_root(root: &Path) -> Self {
        Self::new(root.join(DEFAULT_ERROR_DIR))
    }

    pub fn error_dir(&self) -> &Path {
        &self.error_dir
    }

    /// Directory that mirrors the relative layout of failed files
    pub fn files_dir(&self) -> PathBuf {
        self.error_dir.join(FILES_DIR)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.error_dir.join(ERROR_LOG)
    }

    /// Create the directory layout
    pub async fn prepare(&self) -> Result<()> {
        fs::create_dir_all(self.files_dir()).await.map_err(|e| {
            MigrateError::quarantine_error(&self.error_dir, format!("Failed to create directory: {}", e))
        })?;
        debug!("Error directory: {}", self.error_dir.display());
        Ok(())
    }

    /// Copy `path` into the quarantine tree and log `error`.
    ///
    /// Never fails: problems are logged as warnings and `None` is returned.
    pub async fn quarantine(&self, path: &Path, root: &Path, error: &str) -> Option<PathBuf> {
        match self.try_quarantine(path, root, error).await {
            Ok(destination) => Some(destination),
            Err(e) => {
                warn!("Could not copy failed file {}: {}", sanitize_path(path), e);
                None
            }
        }
    }

    async fn try_quarantine(&self, path: &Path, root: &Path, error: &str) -> Result<PathBuf> {
        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| MigrateError::path_error(path, format!("not under root '{}'", root.display())))?;
        let destination = self.files_dir().join(relative_path);

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::copy(path, &destination).await?;
        preserve_times(path, &destination).await?;

        self.append_log(relative_path, error, &destination).await?;
        Ok(destination)
    }

    async fn append_log(&self, relative_path: &Path, error: &str, destination: &Path) -> Result<()> {
        let entry = format!(
            "[{}] {}\n  Error: {}\n  Copied to: {}\n{}\n",
            Utc::now().to_rfc3339(),
            sanitize_path(relative_path),
            error,
            sanitize_path(destination),
            "-".repeat(ENTRY_SEPARATOR_WIDTH),
        );

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.error_log_path())
            .await?;
        log.write_all(entry.as_bytes()).await?;
        log.flush().await?;
        Ok(())
    }
}

/// Give `destination` the access and modification times of `source`
async fn preserve_times(source: &Path, destination: &Path) -> Result<()> {
    let metadata = fs::metadata(source).await?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);

    filetime::set_file_times(destination, atime, mtime)
        .map_err(|e| MigrateError::path_error(destination, format!("Failed to set file times: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_quarantine_mirrors_relative_path() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("notes/2020")).await.unwrap();
        let source = root.join("notes/2020/a.txt");
        fs::write(&source, b"hello").await.unwrap();

        let old = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_times(&source, old, old).unwrap();

        let quarantine = Quarantine::for_root(root);
        quarantine.prepare().await.unwrap();
        let destination = quarantine
            .quarantine(&source, root, "Insert returned no data")
            .await
            .unwrap();

        assert_eq!(destination, root.join("migration_errors/files/notes/2020/a.txt"));
        assert_eq!(fs::read(&destination).await.unwrap(), b"hello");

        let copied = fs::metadata(&destination).await.unwrap();
        assert_eq!(FileTime::from_last_modification_time(&copied), old);

        let log = fs::read_to_string(quarantine.error_log_path()).await.unwrap();
        assert!(log.contains("] notes/2020/a.txt\n"));
        assert!(log.contains("  Error: Insert returned no data\n"));
        assert!(log.contains("  Copied to: "));
        assert!(log.ends_with(&format!("{}\n", "-".repeat(60))));
    }

    #[tokio::test]
    async fn test_log_is_appended() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), b"a").await.unwrap();
        fs::write(root.join("b.txt"), b"b").await.unwrap();

        let quarantine = Quarantine::for_root(root);
        quarantine.prepare().await.unwrap();
        quarantine.quarantine(&root.join("a.txt"), root, "one").await.unwrap();
        quarantine.quarantine(&root.join("b.txt"), root, "two").await.unwrap();

        let log = fs::read_to_string(quarantine.error_log_path()).await.unwrap();
        assert_eq!(log.matches("  Error: ").count(), 2);
        assert!(log.find("Error: one").unwrap() < log.find("Error: two").unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_is_reported_not_raised() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let quarantine = Quarantine::for_root(root);
        quarantine.prepare().await.unwrap();

        let result = quarantine.quarantine(&root.join("gone.txt"), root, "boom").await;
        assert!(result.is_none());
        assert!(!quarantine.error_log_path().exists());
    }
}
