//! Migration Engine Library
//!
//! Resumable, idempotent migration of a directory tree of text files into a
//! record store:
//! - Candidate selection with extension and directory rules
//! - Path-derived file identities and list fingerprints
//! - Lossy text decoding and sanitization
//! - A crash-safe progress ledger with atomic saves
//! - Quarantine of failed files with an append-only error log
//! - Batched checkpointing, systemic-failure halting and cooperative cancellation

pub mod reader;
pub mod identity;
pub mod selector;
pub mod ledger;
pub mod quarantine;
pub mod progress;
pub mod engine;
pub mod error;

// Re-export main types and functions
pub use reader::{decode_text, read_text, sanitize_path, sanitize_text};
pub use identity::{fingerprint, FileIdentity};
pub use selector::{CandidateFile, FileSelector, SelectorOptions};
pub use ledger::{LedgerState, LedgerStats, ProgressLedger};
pub use quarantine::Quarantine;
pub use progress::{MigrationSummary, ProgressChannel, ProgressEvent, ProgressReporter};
pub use engine::{EnginePhase, ExistingRecords, MigrationEngine, MigrationOptions};
pub use error::{MigrateError, Result};

/// Migrate `root` using the ledger stored at its default location
pub async fn migrate_directory<S: migrate_core::RemoteStore>(
    root: impl AsRef<std::path::Path>,
    store: S,
    options: MigrationOptions,
) -> Result<MigrationSummary> {
    let root = root.as_ref();
    let mut ledger = ProgressLedger::load(ProgressLedger::path_for_root(root)).await;
    let mut engine = MigrationEngine::new(store, options);
    engine.run(root, &mut ledger).await
}

/// Select the candidates under `root` with default rules
pub fn select_files(root: impl AsRef<std::path::Path>) -> Result<Vec<CandidateFile>> {
    FileSelector::default().select(root)
}

// Test modules
#[cfg(test)]
pub(crate) mod test_support;
