use crate::blocking;
use crate::error::GateError;
use crate::overrides::OverrideLedger;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xstack_cache::{CacheStore, GRAPH_DOMAIN};
use xstack_canon::CanonicalArtifact;
use xstack_graph::{scan_manifest, GraphBuilder, RepoGraph, GRAPH_SCHEMA_ID, GRAPH_SCHEMA_VERSION};
use xstack_workspace::Workspace;

/// Everything one gate run shares
#[derive(Debug, Clone)]
pub struct GateContext {
    /// Repository root
    pub repo_root: PathBuf,
    /// Isolated workspace of this run
    pub workspace: Arc<Workspace>,
    /// Immutable repository graph
    pub graph: Arc<RepoGraph>,
    /// Workspace cache
    pub cache: CacheStore,
    /// Override ledger
    pub overrides: OverrideLedger,
}

/// Restore the graph stored for the current tree listing, or build and store it
///
/// The cache key is the digest of the `(path, len, mtime)` manifest, so any
/// edit that the walk can see forces a rebuild.
///
/// # Errors
/// Walk, build, cache failures and cancellation
pub async fn load_graph(
    repo_root: &Path,
    cache: &CacheStore,
    cancel: &CancellationToken,
) -> Result<Arc<RepoGraph>, GateError> {
    let builder = GraphBuilder::new(repo_root).with_cancellation(cancel.clone());

    let root = repo_root.to_path_buf();
    let options = builder.walk_options().clone();
    let token = cancel.clone();
    let manifest = blocking(move || Ok(scan_manifest(&root, &options, &token)?)).await?;
    let key = manifest.digest().to_hex();

    if let Some(hit) = cache.get(GRAPH_DOMAIN, &key).await? {
        if hit.artifact.schema_id == GRAPH_SCHEMA_ID {
            match RepoGraph::from_value(hit.artifact.record.clone()) {
                Ok(graph) => {
                    tracing::debug!(key = %key, nodes = graph.nodes().len(), "graph restored");
                    return Ok(Arc::new(graph));
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "stored graph unreadable, rebuilding"),
            }
        }
    }

    let graph = blocking(move || Ok(builder.build()?)).await?;
    let artifact = CanonicalArtifact::canonical(GRAPH_SCHEMA_ID, GRAPH_SCHEMA_VERSION, graph.to_value());
    cache.put(GRAPH_DOMAIN, &key, &artifact).await?;
    Ok(Arc::new(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xstack_test_utils::sample_tree;
    use xstack_workspace::WorkspaceId;

    #[tokio::test]
    async fn second_load_restores_the_stored_graph() {
        let repo = sample_tree();
        let ws = WorkspaceId::derive(repo.path(), "test", Some("graph"));
        let cache = CacheStore::new(repo.path(), &ws);
        let cancel = CancellationToken::new();

        let built = load_graph(repo.path(), &cache, &cancel).await.unwrap();
        assert_eq!(cache.stats().hits, 0);

        cache.clear_memory();
        let restored = load_graph(repo.path(), &cache, &cancel).await.unwrap();
        assert_eq!(built.fingerprint(), restored.fingerprint());
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn cancelled_build_fails() {
        let repo = sample_tree();
        let ws = WorkspaceId::derive(repo.path(), "test", Some("cancel"));
        let cache = CacheStore::new(repo.path(), &ws);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(load_graph(repo.path(), &cache, &cancel).await.is_err());
    }
}
