//! Migration engine that drives a resumable run over a directory tree

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use migrate_core::{MigrationRecord, RemoteStore, Row, DEFAULT_TABLE};

use crate::error::{MigrateError, Result};
use crate::identity::{self, FileIdentity};
use crate::ledger::ProgressLedger;
use crate::progress::{MigrationSummary, ProgressEvent, ProgressReporter};
use crate::quarantine::{Quarantine, DEFAULT_ERROR_DIR};
use crate::reader::{read_text, sanitize_path, sanitize_text};
use crate::selector::{CandidateFile, FileSelector, SelectorOptions};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;
/// Rows requested per listing page during the existing-record prefetch
pub const EXISTING_PAGE_SIZE: usize = 1000;
const EXISTING_FIELDS: &str = "id,title,updated_at,content";

/// Where the engine is in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnginePhase {
    Idle,
    Scanning,
    FetchingExisting,
    Processing,
    Finalizing,
    Done,
    Interrupted,
    HaltedSystemicFailure,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Idle => "idle",
            EnginePhase::Scanning => "scanning",
            EnginePhase::FetchingExisting => "fetching existing",
            EnginePhase::Processing => "processing",
            EnginePhase::Finalizing => "finalizing",
            EnginePhase::Done => "done",
            EnginePhase::Interrupted => "interrupted",
            EnginePhase::HaltedSystemicFailure => "halted (systemic failure)",
        };
        f.write_str(name)
    }
}

/// Options for migration runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Files per checkpoint
    pub batch_size: usize,
    /// Pause after each checkpoint
    pub batch_delay: Duration,
    /// Skip files that already have a matching remote row
    pub smart_mode: bool,
    /// Source tag stored with every record
    pub device_id: String,
    /// Target table
    pub table: String,
    /// Quarantine directory (defaults to `<root>/migration_errors`)
    pub error_dir: Option<PathBuf>,
    /// Consecutive failures that halt the run
    pub max_consecutive_failures: u32,
    /// Candidate selection rules
    pub selector: SelectorOptions,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            smart_mode: true,
            device_id: "system".to_string(),
            table: DEFAULT_TABLE.to_string(),
            error_dir: None,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            selector: SelectorOptions::default(),
        }
    }
}

/// Remote rows seen during the smart-mode prefetch.
///
/// Store ids say nothing about local files, so a row matches a file when
/// title, `updated_at` and a digest of the content all agree. Same-stem files
/// in different directories can share the first two.
#[derive(Debug, Default, Clone)]
pub struct ExistingRecords {
    ids: HashSet<String>,
    keys: HashSet<(String, i64, blake3::Hash)>,
}

impl ExistingRecords {
    pub fn add_row(&mut self, row: &Row) {
        if let Some(id) = row.get("id") {
            self.ids.insert(id.to_string());
        }

        let title = row.get("title").and_then(|v| v.as_str());
        let updated_at = row.get("updated_at").and_then(|v| v.as_i64());
        let content = row.get("content").and_then(|v| v.as_str());
        if let (Some(title), Some(updated_at), Some(content)) = (title, updated_at, content) {
            self.keys
                .insert((title.to_string(), updated_at, blake3::hash(content.as_bytes())));
        }
    }

    pub fn contains(&self, title: &str, updated_at: i64, content: &str) -> bool {
        self.keys
            .contains(&(title.to_string(), updated_at, blake3::hash(content.as_bytes())))
    }

    /// Number of distinct remote rows seen
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// What happened to one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    AlreadyMigrated,
    Skipped,
    Inserted,
    Failed,
}

#[derive(Debug, Default)]
struct RunCounters {
    inserted: usize,
    skipped: usize,
    errors: usize,
}

/// Main migration engine
pub struct MigrationEngine<S> {
    store: S,
    options: MigrationOptions,
    cancel: CancellationToken,
    reporter: Option<ProgressReporter>,
    phase: EnginePhase,
    consecutive_failures: u32,
    existing: Option<ExistingRecords>,
    counters: RunCounters,
}

impl<S: RemoteStore> MigrationEngine<S> {
    /// Create a new migration engine with options
    pub fn new(store: S, options: MigrationOptions) -> Self {
        Self {
            store,
            options,
            cancel: CancellationToken::new(),
            reporter: None,
            phase: EnginePhase::Idle,
            consecutive_failures: 0,
            existing: None,
            counters: RunCounters::default(),
        }
    }

    /// Stop between files once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Migrate every candidate under `root`, resuming from the ledger cursor
    pub async fn run(&mut self, root: impl AsRef<Path>, ledger: &mut ProgressLedger) -> Result<MigrationSummary> {
        let root = root.as_ref();
        let started = Instant::now();
        self.consecutive_failures = 0;
        self.existing = None;
        self.counters = RunCounters::default();

        info!(
            "Starting migration of {} (device: {}, batch size: {}, smart mode: {})",
            root.display(),
            self.options.device_id,
            self.options.batch_size,
            self.options.smart_mode
        );
        if let Some(reporter) = &self.reporter {
            reporter.emit(ProgressEvent::MigrationStarted {
                session_id: reporter.session_id(),
                root: root.to_path_buf(),
                device_id: self.options.device_id.clone(),
                batch_size: self.options.batch_size,
                smart_mode: self.options.smart_mode,
            });
        }

        let quarantine = Quarantine::new(self.error_dir(root)?);
        quarantine.prepare().await?;

        // Phase 1: select candidates
        self.set_phase(EnginePhase::Scanning);
        let scan_start = Instant::now();
        let files = self.selector_for(root, &quarantine).select(root)?;
        info!("Found {} text files", files.len());
        self.emit(ProgressEvent::ScanCompleted {
            files_found: files.len(),
            duration: scan_start.elapsed(),
        });

        let fingerprint = identity::fingerprint(&files);
        if ledger.file_list_hash().is_some_and(|previous| previous != fingerprint) {
            warn!("File list has changed since last run; consider --reset if files were added or removed");
            self.warn_operator("File list has changed since last run! Consider using --reset if files were added/removed", None);
        }
        ledger.record_file_list(files.len(), fingerprint);

        // Phase 2: existing remote rows
        if self.options.smart_mode {
            self.set_phase(EnginePhase::FetchingExisting);
            self.existing = self.fetch_existing().await?;
        }

        // Phase 3: process from the cursor
        let total = files.len();
        let mut start_index = ledger.cursor();
        if start_index > total {
            warn!("Saved cursor {} is past the {} candidates; nothing left to resume", start_index, total);
            start_index = total;
            ledger.update_cursor(total);
        }
        if start_index > 0 {
            info!("Resuming from file {}/{}", start_index + 1, total);
            self.emit(ProgressEvent::Resuming {
                index: start_index,
                files_total: total,
            });
        }

        self.set_phase(EnginePhase::Processing);
        let batch_size = self.options.batch_size.max(1);
        let total_batches = (total - start_index).div_ceil(batch_size);
        let mut current_batch = 0;

        for (i, file) in files.iter().enumerate().skip(start_index) {
            if self.cancel.is_cancelled() {
                return self.interrupt(ledger, i).await;
            }

            let outcome = self.migrate_file(file, root, ledger, &quarantine).await;
            debug!("{} -> {:?}", file.relative_path.display(), outcome);

            if self.consecutive_failures >= self.options.max_consecutive_failures {
                return self.halt(ledger, i).await;
            }

            ledger.update_cursor(i + 1);

            let files_in_current_batch = (i - start_index) % batch_size + 1;
            let is_last = i + 1 == total;
            if files_in_current_batch == batch_size || is_last {
                current_batch += 1;
                self.checkpoint(ledger).await;

                let stats = ledger.stats();
                self.emit(ProgressEvent::BatchCompleted {
                    batch: current_batch,
                    total_batches,
                    files_processed: i + 1,
                    files_total: total,
                    percentage: (i + 1) as f64 / total as f64 * 100.0,
                    migrated: stats.migrated,
                    skipped: stats.skipped,
                    errors: stats.errors,
                });

                if !is_last && !self.options.batch_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.batch_delay) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
            }
        }

        Ok(self.finalize(ledger, &quarantine, started).await)
    }

    /// Handle one candidate and record the outcome in the ledger
    async fn migrate_file(
        &mut self,
        file: &CandidateFile,
        root: &Path,
        ledger: &mut ProgressLedger,
        quarantine: &Quarantine,
    ) -> FileOutcome {
        let identity = FileIdentity::from_relative(&file.relative_path);
        if ledger.is_migrated(&identity) {
            return FileOutcome::AlreadyMigrated;
        }

        let title = file
            .relative_path
            .file_stem()
            .map(|stem| sanitize_text(&stem.to_string_lossy()).into_owned())
            .unwrap_or_default();

        let (created_at, updated_at) = match file_timestamps(&file.path).await {
            Ok(times) => times,
            Err(e) => return self.fail(file, root, ledger, quarantine, e.to_string()).await,
        };

        let content = match read_text(&file.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Read failed: {}", e);
                return self
                    .fail(file, root, ledger, quarantine, "Could not read file content".to_string())
                    .await;
            }
        };

        if let Some(existing) = &self.existing {
            if existing.contains(&title, updated_at, &content) {
                debug!("{} already present remotely, skipping", file.relative_path.display());
                ledger.mark_skipped(identity);
                self.counters.skipped += 1;
                return FileOutcome::Skipped;
            }
        }

        let record = MigrationRecord {
            title_prefix: MigrationRecord::title_prefix_of(&title),
            title,
            content,
            created_at,
            updated_at,
            device_id: sanitize_text(&self.options.device_id).into_owned(),
        };

        match self.store.insert(&self.options.table, &record).await {
            Ok(Some(stored)) => {
                debug!("Inserted {} as id {}", file.relative_path.display(), stored.id);
                ledger.mark_migrated(identity);
                self.consecutive_failures = 0;
                self.counters.inserted += 1;
                FileOutcome::Inserted
            }
            Ok(None) => {
                self.fail(file, root, ledger, quarantine, "Insert returned no data".to_string())
                    .await
            }
            Err(e) => self.fail(file, root, ledger, quarantine, e.to_string()).await,
        }
    }

    async fn fail(
        &mut self,
        file: &CandidateFile,
        root: &Path,
        ledger: &mut ProgressLedger,
        quarantine: &Quarantine,
        error: String,
    ) -> FileOutcome {
        let relative = sanitize_path(&file.relative_path);
        warn!("Failed to migrate {}: {}", relative, error);

        ledger.mark_failed(relative.clone(), error.clone());
        if quarantine.quarantine(&file.path, root, &error).await.is_none() {
            self.warn_operator("Could not copy failed file to quarantine", Some(relative.clone()));
        }

        self.emit(ProgressEvent::FileFailed {
            relative_path: relative,
            error,
        });
        self.consecutive_failures += 1;
        self.counters.errors += 1;
        FileOutcome::Failed
    }

    /// Page through the table listing.
    ///
    /// Authentication failures abort the run; anything else only disables
    /// duplicate detection.
    async fn fetch_existing(&self) -> Result<Option<ExistingRecords>> {
        info!("Fetching existing records from {}", self.options.table);
        let mut existing = ExistingRecords::default();
        let mut offset = 0;

        loop {
            let page = match self
                .store
                .list(&self.options.table, EXISTING_FIELDS, offset, EXISTING_PAGE_SIZE)
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_authentication() => {
                    return Err(MigrateError::Authentication(e.to_string()));
                }
                Err(e) => {
                    warn!("Could not fetch existing records, continuing without duplicate detection: {}", e);
                    self.warn_operator(format!("Could not fetch existing records: {}", e), None);
                    return Ok(None);
                }
            };

            let page_len = page.len();
            for row in &page {
                existing.add_row(row);
            }

            if page_len < EXISTING_PAGE_SIZE {
                break;
            }
            offset += EXISTING_PAGE_SIZE;
        }

        info!("Found {} existing records", existing.len());
        self.emit(ProgressEvent::ExistingRecordsFetched { count: existing.len() });
        Ok(Some(existing))
    }

    /// Persist the ledger; failures are reported, never fatal
    async fn checkpoint(&self, ledger: &mut ProgressLedger) {
        if let Err(e) = ledger.save().await {
            warn!("Could not save progress: {}", e);
            self.warn_operator(format!("Could not save progress: {}", e), None);
        }
    }

    async fn interrupt(&mut self, ledger: &mut ProgressLedger, index: usize) -> Result<MigrationSummary> {
        self.set_phase(EnginePhase::Interrupted);
        ledger.update_cursor(index);
        self.checkpoint(ledger).await;

        warn!("Migration interrupted; progress saved, next run resumes at file {}", index + 1);
        self.emit(ProgressEvent::Interrupted { resume_index: index });
        Err(MigrateError::Cancelled { resume_index: index })
    }

    /// The failing file stays at the cursor so the next run retries it
    async fn halt(&mut self, ledger: &mut ProgressLedger, index: usize) -> Result<MigrationSummary> {
        self.set_phase(EnginePhase::HaltedSystemicFailure);
        self.checkpoint(ledger).await;

        warn!(
            "{} consecutive failures; this usually indicates invalid credentials or a network problem",
            self.consecutive_failures
        );
        self.emit(ProgressEvent::Halted {
            consecutive_failures: self.consecutive_failures,
            resume_index: index,
        });
        Err(MigrateError::SystemicFailure {
            consecutive: self.consecutive_failures,
            resume_index: index,
        })
    }

    async fn finalize(&mut self, ledger: &mut ProgressLedger, quarantine: &Quarantine, started: Instant) -> MigrationSummary {
        self.set_phase(EnginePhase::Finalizing);
        self.checkpoint(ledger).await;

        let unresolved_failures = ledger.unresolved_failures();
        let stats = ledger.stats();
        let has_errors = stats.errors > 0;
        let summary = MigrationSummary {
            session_id: self.reporter.as_ref().map(|r| r.session_id()).unwrap_or_default(),
            total_files: stats.total_files,
            migrated: stats.migrated,
            skipped: stats.skipped,
            errors: stats.errors,
            run_inserted: self.counters.inserted,
            run_skipped: self.counters.skipped,
            run_errors: self.counters.errors,
            unresolved_failures,
            duration: started.elapsed(),
            quarantine_dir: has_errors.then(|| quarantine.files_dir()),
            error_log: has_errors.then(|| quarantine.error_log_path()),
        };

        info!(
            "Migration complete: {} migrated, {} skipped, {} errors of {} files",
            summary.migrated, summary.skipped, summary.errors, summary.total_files
        );
        self.emit(ProgressEvent::Completed { summary: summary.clone() });
        self.set_phase(EnginePhase::Done);
        summary
    }

    /// Relative error directories resolve against the working directory
    fn error_dir(&self, root: &Path) -> Result<PathBuf> {
        let dir = match &self.options.error_dir {
            Some(dir) => dir.clone(),
            None => root.join(DEFAULT_ERROR_DIR),
        };
        std::path::absolute(&dir)
            .map_err(|e| MigrateError::quarantine_error(&dir, format!("Failed to resolve path: {}", e)))
    }

    /// Selector that also keeps the quarantine tree out of the candidates.
    ///
    /// Both paths are compared in canonical form, so `.` components and
    /// symlinked prefixes on either side still match.
    fn selector_for(&self, root: &Path, quarantine: &Quarantine) -> FileSelector {
        let mut options = self.options.selector.clone();
        let canonical_root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let canonical_dir = std::fs::canonicalize(quarantine.error_dir())
            .unwrap_or_else(|_| quarantine.error_dir().to_path_buf());
        if canonical_dir != canonical_root && canonical_dir.starts_with(&canonical_root) {
            if let Some(name) = canonical_dir.file_name().and_then(|n| n.to_str()) {
                options = options.exclude_dir(name);
            }
        }
        FileSelector::new(options)
    }

    fn set_phase(&mut self, phase: EnginePhase) {
        debug!("Phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(reporter) = &self.reporter {
            reporter.emit(event);
        }
    }

    fn warn_operator(&self, message: impl Into<String>, file_path: Option<String>) {
        if let Some(reporter) = &self.reporter {
            reporter.warning(message, file_path);
        }
    }
}

/// Creation and modification times in epoch milliseconds.
///
/// Platforms without a creation time report the modification time for both.
async fn file_timestamps(path: &Path) -> Result<(i64, i64)> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| MigrateError::path_error(path, format!("Failed to read metadata: {}", e)))?;
    let modified = metadata
        .modified()
        .map_err(|e| MigrateError::path_error(path, format!("No modification time: {}", e)))?;
    let created = metadata.created().unwrap_or(modified);

    Ok((epoch_millis(created), epoch_millis(modified)))
}

fn epoch_millis(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis()
}
