//! Tree snapshots for escape detection
//!
//! The executor snapshots the tree around each layer; any file outside the
//! allow-list that appeared, vanished or changed during the layer is an
//! escape. Generated roots (`out/`, `dist/`, `build/`, `target/`, the cache
//! and VCS metadata) are never part of the snapshot, so concurrent drivers in
//! sibling workspaces do not trip each other.

use crate::error::WorkspaceResult;
use crate::workspace::Workspace;
use std::collections::BTreeMap;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Top-level directories excluded from snapshots
pub const SNAPSHOT_SKIP: [&str; 6] = [".git", ".xstack_cache", "build", "dist", "out", "target"];

/// Size and modification time of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// Length in bytes
    pub len: u64,
    /// Modification time in nanoseconds since the epoch, when available
    pub mtime_ns: Option<u128>,
}

/// `(len, mtime)` of every non-allow-listed file under the repo root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    entries: BTreeMap<String, FileStamp>,
}

impl TreeSnapshot {
    /// Capture the current tree
    ///
    /// # Errors
    /// Walk failures other than files vanishing mid-walk
    pub fn capture(ws: &Workspace) -> WorkspaceResult<Self> {
        let root = ws.repo_root();
        let mut entries = BTreeMap::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() != 1 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !SNAPSHOT_SKIP.contains(&name.as_ref())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.io_error().is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound) => {
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if !entry.file_type().is_file() || ws.allowed(entry.path()) {
                continue;
            }
            let Some(rel) = ws.relative(entry.path()) else {
                continue;
            };
            let Ok(meta) = entry.metadata() else { continue };
            let mtime_ns = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos());
            entries.insert(
                rel,
                FileStamp {
                    len: meta.len(),
                    mtime_ns,
                },
            );
        }

        Ok(Self { entries })
    }

    /// Number of tracked files
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted repo-relative paths that differ between `self` (before) and `after`
    #[must_use]
    pub fn changed_paths(&self, after: &Self) -> Vec<String> {
        let mut changed: Vec<String> = after
            .entries
            .iter()
            .filter(|(path, stamp)| self.entries.get(*path) != Some(stamp))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            self.entries
                .keys()
                .filter(|path| !after.entries.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        changed.dedup();
        changed
    }
}
