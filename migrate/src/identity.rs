//! Path-derived file identities and file list fingerprints

use std::fmt;
use std::path::{Component, Path};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::selector::CandidateFile;

/// Bytes of digest kept (128 bits)
const DIGEST_LEN: usize = 16;

/// Stable bookkeeping key for a file, derived from its path relative to the
/// migration root. Never sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileIdentity(String);

impl FileIdentity {
    /// Derive the identity of `path`, which must live under `root`
    pub fn derive(path: &Path, root: &Path) -> Result<Self> {
        let relative = path.strip_prefix(root).map_err(|_| {
            MigrateError::path_error(path, format!("not under root '{}'", root.display()))
        })?;
        Ok(Self::from_relative(relative))
    }

    /// Identity of an already relative path
    pub fn from_relative(relative: &Path) -> Self {
        let mut hasher = blake3::Hasher::new();
        hash_relative_path(&mut hasher, relative);
        Self(truncated_hex(&hasher))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FileIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Fingerprint of an ordered candidate list, used to notice a changed tree
pub fn fingerprint(files: &[CandidateFile]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hash_relative_path(&mut hasher, &file.relative_path);
    }
    truncated_hex(&hasher)
}

/// Feed path components joined by `/`, independent of the platform separator
fn hash_relative_path(hasher: &mut blake3::Hasher, relative: &Path) {
    let mut first = true;
    for component in relative.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        if !first {
            hasher.update(b"/");
        }
        first = false;
        hasher.update(&component_bytes(part));
    }
}

#[cfg(unix)]
fn component_bytes(part: &std::ffi::OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    part.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn component_bytes(part: &std::ffi::OsStr) -> Vec<u8> {
    part.to_string_lossy().into_owned().into_bytes()
}

fn truncated_hex(hasher: &blake3::Hasher) -> String {
    hasher.finalize().as_bytes()[..DIGEST_LEN]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
