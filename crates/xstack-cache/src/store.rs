//! Disk store with an in-memory read-through layer
//!
//! Layout: `<repo>/.xstack_cache/<ws_id>/<domain>/<key>.json`. Entries are
//! always canonical bytes; anything else found on disk is treated as a miss.

use crate::error::{CacheError, CacheResult};
use moka::future::Cache;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use xstack_canon::{write_atomic, CanonicalArtifact, ContentDigest};
use xstack_workspace::WorkspaceId;

/// Cache directory name under the repo root
pub const CACHE_DIR: &str = ".xstack_cache";

/// A cached entry: exact stored bytes plus the decoded envelope
#[derive(Debug, Clone, PartialEq)]
pub struct CachedArtifact {
    /// Bytes as stored on disk
    pub bytes: Vec<u8>,
    /// Decoded artifact
    pub artifact: CanonicalArtifact,
}

impl CachedArtifact {
    /// SHA-256 of the stored bytes
    #[must_use]
    pub fn digest(&self) -> ContentDigest {
        ContentDigest::compute(&self.bytes)
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful lookups
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries rejected by the corruption guard
    pub corrupt: u64,
    /// Entries currently held in memory
    pub entry_count: u64,
}

/// Workspace-sharded cache of canonical artifacts
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    memory: Cache<PathBuf, Arc<CachedArtifact>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    corrupt: Arc<AtomicU64>,
}

impl CacheStore {
    /// Store for `ws` under `repo_root`
    #[must_use]
    pub fn new(repo_root: &Path, ws: &WorkspaceId) -> Self {
        Self::with_capacity(repo_root, ws, 10_000)
    }

    /// Store with a bounded in-memory layer
    #[must_use]
    pub fn with_capacity(repo_root: &Path, ws: &WorkspaceId, max_capacity: u64) -> Self {
        Self {
            root: repo_root.join(CACHE_DIR).join(ws.as_str()),
            memory: Cache::new(max_capacity),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            corrupt: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shard root (`<repo>/.xstack_cache/<ws_id>`)
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `(domain, key)`
    ///
    /// # Errors
    /// [`CacheError::InvalidKey`] for names outside `[a-z0-9._-]`
    pub fn entry_path(&self, domain: &str, key: &str) -> CacheResult<PathBuf> {
        validate("domain", domain)?;
        validate("key", key)?;
        Ok(self.root.join(domain).join(format!("{key}.json")))
    }

    /// Look up an entry
    ///
    /// Returns `None` on a miss, and also when the stored bytes are not the
    /// canonical encoding of the artifact they decode to.
    ///
    /// # Errors
    /// Invalid names and IO failures other than a missing file
    pub async fn get(&self, domain: &str, key: &str) -> CacheResult<Option<Arc<CachedArtifact>>> {
        let path = self.entry_path(domain, key)?;
        if let Some(hit) = self.memory.get(&path).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(hit));
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(err) => return Err(CacheError::io_error(&path, err)),
        };

        let Some(entry) = verify(bytes) else {
            tracing::warn!(domain, key, "cache entry failed canonical check, ignoring");
            self.corrupt.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let entry = Arc::new(entry);
        self.memory.insert(path, Arc::clone(&entry)).await;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    /// Store an artifact
    ///
    /// The artifact must satisfy its class contract. Bytes go through
    /// temp-file + rename in the entry directory, so concurrent writers of
    /// the same key leave one complete entry.
    ///
    /// # Errors
    /// Contract violations, invalid names, IO failures
    pub async fn put(
        &self,
        domain: &str,
        key: &str,
        artifact: &CanonicalArtifact,
    ) -> CacheResult<Arc<CachedArtifact>> {
        let path = self.entry_path(domain, key)?;
        let bytes = artifact.to_bytes()?;

        let write_path = path.clone();
        let write_bytes = bytes.clone();
        tokio::task::spawn_blocking(move || write_atomic(&write_path, &write_bytes))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))??;

        let entry = Arc::new(CachedArtifact {
            bytes,
            artifact: artifact.clone(),
        });
        self.memory.insert(path, Arc::clone(&entry)).await;
        tracing::trace!(domain, key, "cache entry stored");
        Ok(entry)
    }

    /// Remove an entry from memory and disk
    ///
    /// # Errors
    /// Invalid names and IO failures other than a missing file
    pub async fn discard(&self, domain: &str, key: &str) -> CacheResult<()> {
        let path = self.entry_path(domain, key)?;
        self.memory.invalidate(&path).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::io_error(&path, err)),
        }
    }

    /// Drop the in-memory layer only
    pub fn clear_memory(&self) {
        self.memory.invalidate_all();
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            entry_count: self.memory.entry_count(),
        }
    }
}

fn verify(bytes: Vec<u8>) -> Option<CachedArtifact> {
    let artifact = CanonicalArtifact::from_slice(&bytes).ok()?;
    let reencoded = artifact.to_bytes().ok()?;
    (reencoded == bytes).then_some(CachedArtifact { bytes, artifact })
}

fn validate(kind: &'static str, value: &str) -> CacheResult<()> {
    let ok = !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(CacheError::InvalidKey {
            kind,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store(root: &Path) -> CacheStore {
        CacheStore::new(root, &WorkspaceId::parse("ws-test").unwrap())
    }

    fn artifact(value: u64) -> CanonicalArtifact {
        CanonicalArtifact::canonical("xstack.group.result", "1.0.0", json!({"value": value}))
    }

    #[tokio::test]
    async fn put_then_get_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path());

        let stored = cache.put("groups", "abc", &artifact(1)).await.unwrap();
        let first = cache.get("groups", "abc").await.unwrap().unwrap();
        cache.clear_memory();
        let second = cache.get("groups", "abc").await.unwrap().unwrap();

        assert_eq!(stored.bytes, first.bytes);
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(second.artifact, artifact(1));
        assert_eq!(
            std::fs::read(cache.entry_path("groups", "abc").unwrap()).unwrap(),
            stored.bytes
        );
    }

    #[tokio::test]
    async fn missing_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path());
        assert!(cache.get("groups", "nope").await.unwrap().is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn non_canonical_bytes_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path());
        let path = cache.entry_path("groups", "k").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            b"{ \"artifact_class\": \"CANONICAL\", \"schema_id\": \"s\", \"schema_version\": \"1\", \"record\": {} }",
        )
        .unwrap();

        assert!(cache.get("groups", "k").await.unwrap().is_none());
        assert_eq!(cache.stats().corrupt, 1);
    }

    #[tokio::test]
    async fn drifted_artifact_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path());
        let bad = CanonicalArtifact::canonical("s", "1", json!({"run_id": "r"}));
        let err = cache.put("groups", "k", &bad).await.unwrap_err();
        assert!(matches!(err, CacheError::Canon(ref e) if e.is_drift()));
    }

    #[tokio::test]
    async fn discard_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path());
        cache.put("groups", "k", &artifact(2)).await.unwrap();
        cache.discard("groups", "k").await.unwrap();
        assert!(cache.get("groups", "k").await.unwrap().is_none());
        cache.discard("groups", "k").await.unwrap();
    }

    #[test]
    fn names_are_validated() {
        let cache = store(Path::new("/repo"));
        assert!(cache.entry_path("groups", "a1.b-c_d").is_ok());
        assert!(cache.entry_path("groups", "../x").is_err());
        assert!(cache.entry_path("Groups", "x").is_err());
        assert!(cache.entry_path("groups", "").is_err());
    }
}
