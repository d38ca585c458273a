//! Atomic file writes
//!
//! Readers never observe a partially written file: content goes to a temp
//! file in the destination directory, is flushed, then renamed over the
//! target.

use crate::error::{CanonError, CanonResult};
use std::io::Write;
use std::path::Path;

/// Write `bytes` to `path` via temp-file + rename
///
/// Parent directories are created as needed.
///
/// # Errors
/// Returns [`CanonError::Io`] if the directory, temp file, or rename fails
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CanonResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| CanonError::io_error(parent, e))?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| CanonError::io_error(parent, e))?;
    tmp.write_all(bytes)
        .map_err(|e| CanonError::io_error(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CanonError::io_error(path, e))?;
    tmp.persist(path)
        .map_err(|e| CanonError::io_error(path, e.error))?;
    Ok(())
}
