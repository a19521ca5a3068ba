//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::path::Path;

/// Write content to file atomically (write to .tmp, then rename).
///
/// Readers always see either the old content or the new content, never a
/// partial write.
pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let filename = path.file_name().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let tmp_path = parent.join(format!("{}.tmp", filename.to_string_lossy()));

    fs::write(&tmp_path, content).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("{} (write temp)", operation)))
    })?;

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (rename)", operation))))?;

    Ok(())
}

/// Names of the immediate subdirectories of `dir`, sorted.
///
/// Plain files and unreadable entries are skipped; failing to open `dir`
/// itself is an error.
pub fn list_subdirectories(dir: &Path, operation: &str) -> Result<Vec<OsString>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::internal_io(
            format!("{}: {}", dir.display(), e),
            Some(operation.to_string()),
        )
    })?;

    let mut names: Vec<OsString> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name())
        .collect();
    names.sort();

    Ok(names)
}
