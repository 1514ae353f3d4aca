//! Error types for the migration engine library

use std::path::PathBuf;

use migrate_core::StoreError;

/// Result type alias for migration operations
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Error type for migration operations
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path-related errors
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// A file could not be read with any supported encoding
    #[error("Could not read file content of '{path}': {message}")]
    Read { path: PathBuf, message: String },

    /// Directory scanning errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// Quarantine directory could not be prepared
    #[error("Quarantine error at '{path}': {message}")]
    Quarantine { path: PathBuf, message: String },

    /// Ledger persistence errors
    #[error("Ledger error at '{path}': {message}")]
    Ledger { path: PathBuf, message: String },

    /// Record store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The store rejected our credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Too many files failed in a row; something outside the files is broken
    #[error("{consecutive} consecutive failures, halting (resume at file {})", .resume_index + 1)]
    SystemicFailure { consecutive: u32, resume_index: usize },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("Error: {0}")]
    Generic(#[from] anyhow::Error),

    /// Cancellation error
    #[error("Migration was cancelled (resume at file {})", .resume_index + 1)]
    Cancelled { resume_index: usize },
}

impl MigrateError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new read error
    pub fn read_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new quarantine error
    pub fn quarantine_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Quarantine {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new ledger error
    pub fn ledger_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Ledger {
            path: path.into(),
            message: message.into(),
        }
    }
}
