//! Text extraction with lossy decoding and sanitization

use std::borrow::Cow;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Decode file bytes as UTF-8, replacing every invalid sequence with U+FFFD
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Read a file as sanitized text. Fails only on I/O errors.
pub async fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).await.map_err(|e| {
        debug!("Reading {} failed: {}", path.display(), e);
        MigrateError::read_error(path, e.to_string())
    })?;

    Ok(sanitize_text(&decode_text(&bytes)).into_owned())
}

/// Remove characters the target text columns cannot store.
///
/// Rust strings are always valid Unicode, so the only remaining hazard is
/// NUL. Everything else passes through unchanged.
pub fn sanitize_text(text: &str) -> Cow<'_, str> {
    if text.contains('\0') {
        Cow::Owned(text.replace('\0', ""))
    } else {
        Cow::Borrowed(text)
    }
}

/// Printable rendering of a path; undecodable bytes become U+FFFD
pub fn sanitize_path(path: &Path) -> String {
    sanitize_text(&path.to_string_lossy()).into_owned()
}
