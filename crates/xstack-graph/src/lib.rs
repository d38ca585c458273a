//! xstack repository graph
//!
//! Structural graph shared by the repo-structure and semantic auditors:
//! file, pack and schema nodes plus include/import/requires/provides/
//! references edges. Built once per run and immutable afterwards.
//!
//! # Core Concepts
//!
//! - [`GraphBuilder`]: walks the tree (walkdir) and parses files in parallel (rayon)
//! - [`RepoGraph`]: sorted nodes/edges with `by_id` and `edges_by_src` indices
//! - [`scan_manifest`]: cheap tree listing used to restore a stored graph
//!
//! Every edge endpoint is a node; references that cannot be resolved are
//! kept in [`RepoGraph::unresolved`].

mod builder;
mod error;
mod extract;
mod manifest;
mod model;
mod walk;

pub use builder::{file_tags, is_source_module, GraphBuilder, DEFAULT_INCLUDE_ROOTS, MAX_PARSE_BYTES};
pub use error::{GraphError, GraphResult};
pub use extract::{
    default_extractors, in_schema_dir, Extractor, ExtractorRegistry, IncludeExtractor,
    JsImportExtractor, PackManifestExtractor, PythonImportExtractor, RawRef, SchemaExtractor,
};
pub use manifest::{scan_manifest, ManifestEntry, ScanManifest};
pub use model::{
    file_id, pack_id, schema_id, EdgeType, GraphEdge, GraphNode, NodeType, RepoGraph,
    UnresolvedRef,
};
pub use walk::{is_skipped, rel_path, walk_files, WalkOptions, WalkedFile, LEGACY_DIR, SKIP_DIRS};

/// Schema id of stored graph artifacts
pub const GRAPH_SCHEMA_ID: &str = "xstack.repo_graph";

/// Schema version of stored graph artifacts
pub const GRAPH_SCHEMA_VERSION: &str = "1.0.0";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
