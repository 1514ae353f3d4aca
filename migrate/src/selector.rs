//! Candidate file selection using walkdir

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{MigrateError, Result};

/// Extensions migrated by default (compared case-insensitively, no dot)
pub const DEFAULT_EXTENSIONS: &[&str] = &["txt"];

/// Directory names never descended into
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    ".venv",
    "node_modules",
    "__pycache__",
    "venv",
    "env",
    "build",
    "dist",
    ".idea",
    ".gradle",
    "migration_errors",
];

/// Options for candidate selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorOptions {
    /// File extensions to include
    pub include_extensions: Vec<String>,
    /// Path segment names to exclude
    pub exclude_dirs: Vec<String>,
    /// Maximum recursion depth (None for unlimited)
    pub max_depth: Option<usize>,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            include_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            max_depth: None,
        }
    }
}

impl SelectorOptions {
    /// Add one more excluded segment name
    pub fn exclude_dir(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.exclude_dirs.contains(&name) {
            self.exclude_dirs.push(name);
        }
        self
    }
}

/// A file chosen for migration in this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Relative path from the migration root
    pub relative_path: PathBuf,
}

/// Walks a tree and returns the files eligible for migration
pub struct FileSelector {
    options: SelectorOptions,
    extensions: HashSet<String>,
    exclude_dirs: HashSet<String>,
}

impl Default for FileSelector {
    fn default() -> Self {
        Self::new(SelectorOptions::default())
    }
}

impl FileSelector {
    /// Create a new selector with options
    pub fn new(options: SelectorOptions) -> Self {
        let extensions = options
            .include_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        let exclude_dirs = options.exclude_dirs.iter().cloned().collect();

        Self {
            options,
            extensions,
            exclude_dirs,
        }
    }

    /// Select candidates under `root`, sorted by relative path
    pub fn select<P: AsRef<Path>>(&self, root: P) -> Result<Vec<CandidateFile>> {
        let root = root.as_ref();

        if !root.exists() {
            return Err(MigrateError::path_error(root, "Directory does not exist"));
        }

        if !root.is_dir() {
            return Err(MigrateError::path_error(root, "Path is not a directory"));
        }

        let mut walker = WalkDir::new(root).follow_links(false);
        if let Some(max_depth) = self.options.max_depth {
            walker = walker.max_depth(max_depth);
        }

        let mut candidates = Vec::new();

        for entry in walker
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded_name(entry))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if entry.depth() == 0 || !self.has_included_extension(entry.path()) {
                continue;
            }

            // Follows symlinks: a link to a regular file qualifies
            if !entry.path().is_file() {
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| MigrateError::scan_error(entry.path(), format!("Failed to create relative path: {}", e)))?
                .to_path_buf();

            candidates.push(CandidateFile {
                path: entry.path().to_path_buf(),
                relative_path,
            });
        }

        candidates.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        debug!("Selected {} candidates under {}", candidates.len(), root.display());

        Ok(candidates)
    }

    /// Check a relative path against both rules without touching the disk
    pub fn matches(&self, relative_path: &Path) -> bool {
        let excluded = relative_path
            .components()
            .any(|c| c.as_os_str().to_str().is_some_and(|s| self.exclude_dirs.contains(s)));

        !excluded && self.has_included_extension(relative_path)
    }

    fn is_excluded_name(&self, entry: &DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .is_some_and(|name| self.exclude_dirs.contains(name))
    }

    fn has_included_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_matches() {
        let selector = FileSelector::default();

        assert!(selector.matches(&PathBuf::from("a.txt")));
        assert!(selector.matches(&PathBuf::from("notes/A.TXT")));
        assert!(!selector.matches(&PathBuf::from("c.bin")));
        assert!(!selector.matches(&PathBuf::from("node_modules/pkg/readme.txt")));
        assert!(!selector.matches(&PathBuf::from("migration_errors/files/a.txt")));
        assert!(!selector.matches(&PathBuf::from("txt")));
    }

    #[test]
    fn test_custom_extensions_accept_leading_dot() {
        let selector = FileSelector::new(SelectorOptions {
            include_extensions: vec![".md".to_string(), "TXT".to_string()],
            ..Default::default()
        });

        assert!(selector.matches(&PathBuf::from("a.md")));
        assert!(selector.matches(&PathBuf::from("a.txt")));
    }

    #[test]
    fn test_exclude_dir_is_not_duplicated() {
        let options = SelectorOptions::default().exclude_dir("quarantine").exclude_dir("quarantine");
        assert_eq!(options.exclude_dirs.iter().filter(|d| *d == "quarantine").count(), 1);
    }
}
