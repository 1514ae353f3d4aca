//! Durable, crash-safe record of migration progress
//!
//! The ledger is one pretty-printed JSON document at the migration root. It
//! is rewritten in full on every save: the new version goes to a sibling
//! temp file which is then renamed over the canonical one, so a crash at any
//! point leaves either the old or the new document on disk, never a mix.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::identity::FileIdentity;

/// Ledger file name under the migration root
pub const LEDGER_FILE_NAME: &str = ".migration_progress.json";

/// Running totals kept alongside the sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerStats {
    pub total_files: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Everything persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    pub migrated_ids: BTreeSet<FileIdentity>,
    pub skipped: BTreeSet<FileIdentity>,
    /// File reference (relative path) to the last error seen for it
    pub failed: BTreeMap<String, String>,
    /// Next index of the ordered candidate list to process
    pub last_file_index: usize,
    pub total_files: usize,
    pub stats: LedgerStats,
    pub file_list_hash: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Progress ledger bound to one file on disk
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    state: LedgerState,
}

impl ProgressLedger {
    /// Ledger location for a migration root
    pub fn path_for_root(root: &Path) -> PathBuf {
        root.join(LEDGER_FILE_NAME)
    }

    /// Load the ledger at `path`.
    ///
    /// A missing file gives a fresh state. An unreadable or corrupt file is
    /// reported and also gives a fresh state; this never fails.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match Self::read_state(&path).await {
            Ok(Some(state)) => {
                info!(
                    "Loaded progress: {} files already migrated, next index {}",
                    state.migrated_ids.len(),
                    state.last_file_index
                );
                state
            }
            Ok(None) => LedgerState::default(),
            Err(e) => {
                warn!("Could not load progress ledger, starting fresh: {}", e);
                LedgerState::default()
            }
        };

        Self { path, state }
    }

    async fn read_state(path: &Path) -> Result<Option<LedgerState>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MigrateError::ledger_error(path, format!("Failed to read: {}", e))),
        };

        let state = serde_json::from_slice(&raw)
            .map_err(|e| MigrateError::ledger_error(path, format!("Failed to parse: {}", e)))?;
        Ok(Some(state))
    }

    /// Write the full state atomically (temp file, fsync, rename)
    pub async fn save(&mut self) -> Result<()> {
        self.state.last_updated = Some(Utc::now());
        let body = serde_json::to_vec_pretty(&self.state)?;

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| MigrateError::ledger_error(&temp_path, format!("Failed to create: {}", e)))?;
        file.write_all(&body)
            .await
            .map_err(|e| MigrateError::ledger_error(&temp_path, format!("Failed to write: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| MigrateError::ledger_error(&temp_path, format!("Failed to sync: {}", e)))?;
        drop(file);

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            MigrateError::ledger_error(&self.path, format!("Failed to replace from {}: {}", temp_path.display(), e))
        })?;

        Ok(())
    }

    /// Clear all progress in memory and on disk
    pub async fn reset(&mut self) -> Result<()> {
        self.state = LedgerState::default();

        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => info!("Progress ledger deleted: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(MigrateError::ledger_error(path, format!("Failed to delete: {}", e))),
            }
        }

        Ok(())
    }

    pub fn is_migrated(&self, id: &FileIdentity) -> bool {
        self.state.migrated_ids.contains(id)
    }

    pub fn is_skipped(&self, id: &FileIdentity) -> bool {
        self.state.skipped.contains(id)
    }

    /// Returns false (and counts nothing) when `id` was already migrated
    pub fn mark_migrated(&mut self, id: FileIdentity) -> bool {
        let inserted = self.state.migrated_ids.insert(id);
        if inserted {
            self.state.stats.migrated += 1;
        }
        inserted
    }

    /// Returns false (and counts nothing) when `id` was already skipped
    pub fn mark_skipped(&mut self, id: FileIdentity) -> bool {
        let inserted = self.state.skipped.insert(id);
        if inserted {
            self.state.stats.skipped += 1;
        }
        inserted
    }

    /// Record the latest error for `reference`. Every call counts as an error.
    pub fn mark_failed(&mut self, reference: impl Into<String>, error: impl Into<String>) {
        self.state.failed.insert(reference.into(), error.into());
        self.state.stats.errors += 1;
    }

    /// Failed files that have not since been migrated or skipped
    pub fn unresolved_failures(&self) -> usize {
        self.state
            .failed
            .keys()
            .map(|reference| FileIdentity::from_relative(Path::new(reference)))
            .filter(|id| !self.is_migrated(id) && !self.is_skipped(id))
            .count()
    }

    pub fn update_cursor(&mut self, index: usize) {
        self.state.last_file_index = index;
    }

    pub fn cursor(&self) -> usize {
        self.state.last_file_index
    }

    /// Remember the size and fingerprint of the current candidate list
    pub fn record_file_list(&mut self, total: usize, fingerprint: impl Into<String>) {
        self.state.total_files = total;
        self.state.stats.total_files = total;
        self.state.file_list_hash = Some(fingerprint.into());
    }

    pub fn file_list_hash(&self) -> Option<&str> {
        self.state.file_list_hash.as_deref()
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.state.stats
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the next version is written to before the swap
    pub fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(name: &str) -> FileIdentity {
        FileIdentity::from_relative(Path::new(name))
    }

    #[tokio::test]
    async fn test_missing_file_gives_fresh_state() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = ProgressLedger::load(ProgressLedger::path_for_root(temp_dir.path())).await;

        assert_eq!(ledger.state(), &LedgerState::default());
        assert_eq!(ledger.cursor(), 0);
    }

    #[test]
    fn test_unresolved_failures_ignore_later_successes() {
        let mut ledger = ProgressLedger {
            path: PathBuf::from("unused.json"),
            state: LedgerState::default(),
        };
        ledger.mark_failed("a.txt", "boom");
        ledger.mark_failed("notes/b.txt", "boom");
        ledger.mark_failed("c.txt", "boom");
        assert_eq!(ledger.unresolved_failures(), 3);

        ledger.mark_migrated(id("a.txt"));
        ledger.mark_skipped(id("notes/b.txt"));
        assert_eq!(ledger.unresolved_failures(), 1);
        assert_eq!(ledger.stats().errors, 3);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = ProgressLedger::path_for_root(temp_dir.path());

        let mut ledger = ProgressLedger::load(&path).await;
        ledger.record_file_list(3, "abc");
        ledger.mark_migrated(id("a.txt"));
        ledger.mark_skipped(id("b.txt"));
        ledger.mark_failed("c.txt", "Insert returned no data");
        ledger.update_cursor(3);
        ledger.save().await.unwrap();

        let reloaded = ProgressLedger::load(&path).await;
        assert!(reloaded.is_migrated(&id("a.txt")));
        assert!(reloaded.is_skipped(&id("b.txt")));
        assert_eq!(reloaded.state().failed["c.txt"], "Insert returned no data");
        assert_eq!(reloaded.cursor(), 3);
        assert_eq!(reloaded.file_list_hash(), Some("abc"));
        assert_eq!(
            reloaded.stats(),
            &LedgerStats { total_files: 3, migrated: 1, skipped: 1, errors: 1 }
        );
        assert!(reloaded.state().last_updated.is_some());
        assert!(!ledger.temp_path().exists());
    }

    #[test]
    fn test_marking_is_idempotent() {
        let mut ledger = ProgressLedger {
            path: PathBuf::from("unused.json"),
            state: LedgerState::default(),
        };

        assert!(ledger.mark_migrated(id("a.txt")));
        assert!(!ledger.mark_migrated(id("a.txt")));
        assert!(ledger.mark_skipped(id("b.txt")));
        assert!(!ledger.mark_skipped(id("b.txt")));

        assert_eq!(ledger.stats().migrated, 1);
        assert_eq!(ledger.stats().skipped, 1);
    }

    #[test]
    fn test_failures_always_count() {
        let mut ledger = ProgressLedger {
            path: PathBuf::from("unused.json"),
            state: LedgerState::default(),
        };

        ledger.mark_failed("a.txt", "first");
        ledger.mark_failed("a.txt", "second");

        assert_eq!(ledger.stats().errors, 2);
        assert_eq!(ledger.state().failed.len(), 1);
        assert_eq!(ledger.state().failed["a.txt"], "second");
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_fresh_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = ProgressLedger::path_for_root(temp_dir.path());
        fs::write(&path, b"{ not json").await.unwrap();

        let ledger = ProgressLedger::load(&path).await;
        assert_eq!(ledger.state(), &LedgerState::default());
    }

    #[tokio::test]
    async fn test_crash_before_replace_keeps_previous_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = ProgressLedger::path_for_root(temp_dir.path());

        let mut ledger = ProgressLedger::load(&path).await;
        ledger.mark_migrated(id("a.txt"));
        ledger.update_cursor(1);
        ledger.save().await.unwrap();

        // A crash after the temp write but before the rename leaves a
        // partial temp file next to the canonical one.
        fs::write(ledger.temp_path(), b"{\"migrated_ids\": [\"trunc").await.unwrap();

        let reloaded = ProgressLedger::load(&path).await;
        assert!(reloaded.is_migrated(&id("a.txt")));
        assert_eq!(reloaded.cursor(), 1);

        // The stray temp file does not block the next save
        let mut reloaded = reloaded;
        reloaded.update_cursor(2);
        reloaded.save().await.unwrap();
        assert_eq!(ProgressLedger::load(&path).await.cursor(), 2);
    }

    #[tokio::test]
    async fn test_reset_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = ProgressLedger::path_for_root(temp_dir.path());

        let mut ledger = ProgressLedger::load(&path).await;
        ledger.mark_migrated(id("a.txt"));
        ledger.save().await.unwrap();
        assert!(path.exists());

        ledger.reset().await.unwrap();
        assert!(!path.exists());
        assert_eq!(ledger.state(), &LedgerState::default());

        // Resetting twice is fine
        ledger.reset().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_fields_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = ProgressLedger::path_for_root(temp_dir.path());
        fs::write(&path, br#"{"last_file_index": 7, "stats": {"migrated": 7}}"#).await.unwrap();

        let ledger = ProgressLedger::load(&path).await;
        assert_eq!(ledger.cursor(), 7);
        assert_eq!(ledger.stats().migrated, 7);
        assert!(ledger.state().migrated_ids.is_empty());
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_reports_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone").join(LEDGER_FILE_NAME);

        let mut ledger = ProgressLedger::load(&path).await;
        let result = ledger.save().await;
        assert!(matches!(result, Err(MigrateError::Ledger { .. })));
    }
}
