//! Scan manifest for incremental graph restore
//!
//! A cheap `(path, len, mtime)` listing of the walked tree. When its hash
//! matches the one a stored graph was built from, the graph is reused
//! instead of re-parsing every file.

use crate::error::GraphResult;
use crate::walk::{walk_files, WalkOptions};
use serde::Serialize;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio_util::sync::CancellationToken;
use xstack_canon::{canonical_sha256, ContentDigest};

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Repo-relative path
    pub path: String,
    /// Length in bytes
    pub len: u64,
    /// Modification time, nanoseconds since the epoch (0 if unavailable)
    pub mtime_ns: u64,
}

/// Sorted manifest of the walked tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanManifest {
    /// Entries sorted by path
    pub entries: Vec<ManifestEntry>,
    /// Whether legacy directories were walked
    pub include_legacy: bool,
}

impl ScanManifest {
    /// Canonical hash, used as the graph cache key
    #[must_use]
    pub fn digest(&self) -> ContentDigest {
        let value = serde_json::to_value(self).unwrap_or_default();
        canonical_sha256(&value)
    }
}

/// Build the manifest with the same walk rules as the graph builder
///
/// # Errors
/// Walk failures and cancellation
pub fn scan_manifest(
    root: &Path,
    opts: &WalkOptions,
    cancel: &CancellationToken,
) -> GraphResult<ScanManifest> {
    let files = walk_files(root, opts, cancel)?;
    let entries = files
        .into_iter()
        .filter_map(|file| {
            let meta = std::fs::metadata(&file.abs).ok()?;
            let mtime_ns = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
            Some(ManifestEntry {
                path: file.rel,
                len: meta.len(),
                mtime_ns,
            })
        })
        .collect();
    Ok(ScanManifest {
        entries,
        include_legacy: opts.include_legacy,
    })
}
