//! Tree walk shared by the graph builder and the scan manifest

use crate::error::{GraphError, GraphResult};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Repo-relative directories never walked
pub const SKIP_DIRS: [&str; 9] = [
    ".git",
    ".xstack_cache",
    "build",
    "out",
    "dist",
    "target",
    "docs/archive",
    "docs/audit/remediation",
    "node_modules",
];

/// Directory name that marks legacy code
pub const LEGACY_DIR: &str = "legacy";

/// Walk configuration
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Walk `legacy/` directories
    pub include_legacy: bool,
    /// Extra repo-relative directories to skip
    pub extra_skip: Vec<String>,
}

/// A file found by the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Repo-relative path with `/` separators
    pub rel: String,
    /// Absolute path
    pub abs: PathBuf,
}

/// Repo-relative path with `/` separators
#[must_use]
pub fn rel_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Whether the repo-relative directory `rel` is left out of walks
#[must_use]
pub fn is_skipped(rel: &str, opts: &WalkOptions) -> bool {
    if SKIP_DIRS.contains(&rel) || opts.extra_skip.iter().any(|s| s == rel) {
        return true;
    }
    let name = rel.rsplit('/').next().unwrap_or(rel);
    if name == ".git" || name == ".xstack_cache" {
        return true;
    }
    !opts.include_legacy && name == LEGACY_DIR
}

/// All regular files under `root`, sorted by relative path
///
/// # Errors
/// Walk failures and [`GraphError::Cancelled`]
pub fn walk_files(
    root: &Path,
    opts: &WalkOptions,
    cancel: &CancellationToken,
) -> GraphResult<Vec<WalkedFile>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            rel_path(root, entry.path()).map_or(true, |rel| !is_skipped(&rel, opts))
        });

    let mut files = Vec::new();
    for entry in walker {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err)
                if err
                    .io_error()
                    .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound) =>
            {
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        // In-flight atomic writes from concurrent runs
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with(".tmp") {
            continue;
        }
        if let Some(rel) = rel_path(root, entry.path()) {
            files.push(WalkedFile {
                rel,
                abs: entry.into_path(),
            });
        }
    }
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_set() {
        let opts = WalkOptions::default();
        assert!(is_skipped("out", &opts));
        assert!(is_skipped("docs/archive", &opts));
        assert!(is_skipped("docs/audit/remediation", &opts));
        assert!(is_skipped("engine/legacy", &opts));
        assert!(is_skipped("sub/.git", &opts));
        assert!(!is_skipped("docs", &opts));
        assert!(!is_skipped("engine/out", &opts));

        let with_legacy = WalkOptions {
            include_legacy: true,
            ..WalkOptions::default()
        };
        assert!(!is_skipped("legacy", &with_legacy));
    }

    #[test]
    fn cancelled_walk_stops() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = walk_files(dir.path(), &WalkOptions::default(), &token).unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }
}
