//! Graph construction
//!
//! Walk → parallel read/extract (rayon) → sequential resolution against the
//! file set. Resolution is sequential and over sorted inputs, so the result
//! never depends on thread scheduling.

use crate::error::{GraphError, GraphResult};
use crate::extract::{default_extractors, ExtractorRegistry, RawRef};
use crate::model::{
    file_id, pack_id, schema_id, EdgeType, GraphEdge, GraphNode, NodeType, RepoGraph,
    UnresolvedRef,
};
use crate::walk::{walk_files, WalkOptions, WalkedFile, LEGACY_DIR};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xstack_canon::ContentDigest;

/// Default include roots, tried after the including file's directory
pub const DEFAULT_INCLUDE_ROOTS: [&str; 3] = ["include", "engine/include", ""];

/// Files above this size are hashed but not parsed
pub const MAX_PARSE_BYTES: usize = 4 * 1024 * 1024;

const JS_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Builds a [`RepoGraph`] from a source tree
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    root: PathBuf,
    options: WalkOptions,
    include_roots: Vec<String>,
    extractors: Arc<ExtractorRegistry>,
    cancel: CancellationToken,
}

struct ParsedFile {
    rel: String,
    digest: String,
    refs: Vec<RawRef>,
}

impl GraphBuilder {
    /// Builder for the tree at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: WalkOptions::default(),
            include_roots: DEFAULT_INCLUDE_ROOTS.iter().map(|s| (*s).to_string()).collect(),
            extractors: Arc::new(default_extractors()),
            cancel: CancellationToken::new(),
        }
    }

    /// Walk `legacy/` directories too
    #[must_use]
    pub fn with_include_legacy(mut self, include: bool) -> Self {
        self.options.include_legacy = include;
        self
    }

    /// Replace the include roots
    #[must_use]
    pub fn with_include_roots(mut self, roots: Vec<String>) -> Self {
        self.include_roots = roots;
        self
    }

    /// Skip additional repo-relative directories
    #[must_use]
    pub fn with_extra_skip(mut self, skip: Vec<String>) -> Self {
        self.options.extra_skip = skip;
        self
    }

    /// Abort the build when `token` fires
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Walk options in effect
    #[must_use]
    pub fn walk_options(&self) -> &WalkOptions {
        &self.options
    }

    /// Tree root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the graph
    ///
    /// # Errors
    /// Walk or read failures, cancellation
    pub fn build(&self) -> GraphResult<RepoGraph> {
        let files = walk_files(&self.root, &self.options, &self.cancel)?;
        tracing::debug!(files = files.len(), root = %self.root.display(), "graph walk complete");

        let parsed: Vec<ParsedFile> = files
            .par_iter()
            .map(|file| self.parse(file))
            .collect::<GraphResult<Vec<Option<ParsedFile>>>>()?
            .into_iter()
            .flatten()
            .collect();

        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let graph = self.assemble(&parsed)?;
        tracing::info!(
            nodes = graph.nodes().len(),
            edges = graph.edges().len(),
            unresolved = graph.unresolved().len(),
            "graph built"
        );
        Ok(graph)
    }

    fn parse(&self, file: &WalkedFile) -> GraphResult<Option<ParsedFile>> {
        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let bytes = match std::fs::read(&file.abs) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(GraphError::io_error(&file.abs, err)),
        };
        let digest = ContentDigest::compute(&bytes).to_hex();
        let refs = if bytes.len() <= MAX_PARSE_BYTES {
            std::str::from_utf8(&bytes)
                .map(|text| self.extractors.extract(&file.rel, text))
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(Some(ParsedFile {
            rel: file.rel.clone(),
            digest,
            refs,
        }))
    }

    fn assemble(&self, parsed: &[ParsedFile]) -> GraphResult<RepoGraph> {
        let file_set: HashSet<&str> = parsed.iter().map(|p| p.rel.as_str()).collect();

        // Declarations first, so references can resolve regardless of order
        let mut packs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut schemas: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for file in parsed {
            for raw in &file.refs {
                match raw {
                    RawRef::Pack { pack_id, .. } => {
                        packs.entry(pack_id.clone()).or_default().insert(file.rel.clone());
                    }
                    RawRef::SchemaDecl { id, .. } => {
                        schemas.entry(id.clone()).or_default().insert(file.rel.clone());
                    }
                    _ => {}
                }
            }
        }

        let mut nodes: Vec<GraphNode> = parsed
            .iter()
            .map(|file| GraphNode {
                node_id: file_id(&file.rel),
                node_type: NodeType::File,
                label: file.rel.clone(),
                digest: Some(file.digest.clone()),
                tags: file_tags(&file.rel),
            })
            .collect();
        nodes.extend(packs.keys().map(|id| GraphNode {
            node_id: pack_id(id),
            node_type: NodeType::Pack,
            label: id.clone(),
            digest: None,
            tags: BTreeSet::new(),
        }));
        nodes.extend(schemas.iter().map(|(id, files)| {
            let mut tags = BTreeSet::new();
            if files.iter().any(|f| is_core_schema_path(f)) {
                tags.insert("core-schema".to_string());
            }
            GraphNode {
                node_id: schema_id(id),
                node_type: NodeType::Schema,
                label: id.clone(),
                digest: None,
                tags,
            }
        }));

        let mut edges = Vec::new();
        let mut unresolved = Vec::new();
        let mut resolver = Resolver {
            file_set: &file_set,
            include_roots: &self.include_roots,
            packs: &packs,
            schemas: &schemas,
            edges: &mut edges,
            unresolved: &mut unresolved,
        };
        for file in parsed {
            for raw in &file.refs {
                resolver.resolve(&file.rel, raw);
            }
        }

        RepoGraph::from_parts(nodes, edges, unresolved)
    }
}

struct Resolver<'a> {
    file_set: &'a HashSet<&'a str>,
    include_roots: &'a [String],
    packs: &'a BTreeMap<String, BTreeSet<String>>,
    schemas: &'a BTreeMap<String, BTreeSet<String>>,
    edges: &'a mut Vec<GraphEdge>,
    unresolved: &'a mut Vec<UnresolvedRef>,
}

impl Resolver<'_> {
    fn edge(&mut self, src: String, dst: String, edge_type: EdgeType) {
        self.edges.push(GraphEdge { src, dst, edge_type });
    }

    fn miss(&mut self, src: String, target: &str, edge_type: EdgeType, line: u32) {
        self.unresolved.push(UnresolvedRef {
            src,
            target: target.to_string(),
            edge_type,
            line,
        });
    }

    fn first_existing(&self, candidates: impl IntoIterator<Item = String>) -> Option<String> {
        candidates
            .into_iter()
            .find(|c| self.file_set.contains(c.as_str()))
    }

    fn resolve(&mut self, rel: &str, raw: &RawRef) {
        let src = file_id(rel);
        let dir = parent_dir(rel);
        match raw {
            RawRef::Include {
                target,
                quoted,
                line,
            } => {
                let candidates = std::iter::once(join_rel(dir, target))
                    .chain(self.include_roots.iter().map(|root| join_rel(root, target)))
                    .flatten();
                match self.first_existing(candidates) {
                    Some(hit) if hit != rel => self.edge(src, file_id(&hit), EdgeType::Include),
                    Some(_) => {}
                    None if *quoted => self.miss(src, target, EdgeType::Include, *line),
                    None => {}
                }
            }
            RawRef::PyImport {
                module,
                names,
                line,
            } => {
                let hits = self.python_targets(dir, module, names);
                if hits.is_empty() {
                    if module.starts_with('.') {
                        self.miss(src, module, EdgeType::Import, *line);
                    }
                } else {
                    for hit in hits.into_iter().filter(|h| h != rel) {
                        self.edge(src.clone(), file_id(&hit), EdgeType::Import);
                    }
                }
            }
            RawRef::JsImport { specifier, line } => {
                let hit = join_rel(dir, specifier).and_then(|base| {
                    let mut candidates = vec![base.clone()];
                    candidates.extend(JS_EXTENSIONS.iter().map(|ext| format!("{base}.{ext}")));
                    candidates.extend(JS_EXTENSIONS.iter().map(|ext| format!("{base}/index.{ext}")));
                    self.first_existing(candidates)
                });
                match hit {
                    Some(hit) => self.edge(src, file_id(&hit), EdgeType::Import),
                    None => self.miss(src, specifier, EdgeType::Import, *line),
                }
            }
            RawRef::Pack {
                pack_id: id,
                requires,
                provides,
            } => {
                let pack = pack_id(id);
                self.edge(src, pack.clone(), EdgeType::Provides);
                for req in requires {
                    if self.packs.contains_key(req) {
                        self.edge(pack.clone(), pack_id(req), EdgeType::Requires);
                    } else if self.schemas.contains_key(req) {
                        self.edge(pack.clone(), schema_id(req), EdgeType::Requires);
                    } else {
                        self.miss(pack.clone(), req, EdgeType::Requires, 0);
                    }
                }
                for provided in provides {
                    if self.schemas.contains_key(provided) {
                        self.edge(pack.clone(), schema_id(provided), EdgeType::Provides);
                    } else if self.packs.contains_key(provided) && provided != id {
                        self.edge(pack.clone(), pack_id(provided), EdgeType::Provides);
                    } else {
                        self.miss(pack.clone(), provided, EdgeType::Provides, 0);
                    }
                }
            }
            RawRef::SchemaDecl { id, .. } => {
                self.edge(src, schema_id(id), EdgeType::Provides);
            }
            RawRef::SchemaRef { id, line } => {
                if self.schemas.contains_key(id) {
                    self.edge(src, schema_id(id), EdgeType::References);
                } else {
                    self.miss(src, id, EdgeType::References, *line);
                }
            }
        }
    }

    fn python_targets(&self, dir: &str, module: &str, names: &[String]) -> Vec<String> {
        let dots = module.chars().take_while(|c| *c == '.').count();
        let rest = module[dots..].replace('.', "/");

        let bases: Vec<String> = if dots > 0 {
            let mut base = dir.to_string();
            for _ in 1..dots {
                base = parent_dir(&base).to_string();
            }
            vec![base]
        } else {
            let mut bases = vec![dir.to_string()];
            if !dir.is_empty() {
                bases.push(String::new());
            }
            bases
        };

        let mut hits = Vec::new();
        for base in &bases {
            let module_path = join_rel(base, &rest).unwrap_or_default();
            if !rest.is_empty() {
                let found = self.first_existing([
                    format!("{module_path}.py"),
                    format!("{module_path}/__init__.py"),
                ]);
                if let Some(found) = found {
                    hits.push(found);
                }
            }
            for name in names {
                let sub = join_rel(&module_path, name).unwrap_or_default();
                if let Some(found) = self.first_existing([format!("{sub}.py"), format!("{sub}/__init__.py")]) {
                    hits.push(found);
                }
            }
            if !hits.is_empty() {
                break;
            }
        }
        hits.sort();
        hits.dedup();
        hits
    }
}

fn parent_dir(rel: &str) -> &str {
    rel.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Join and normalise repo-relative paths; `None` if `..` escapes the root
fn join_rel(base: &str, target: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in base.split('/').chain(target.split('/')) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

fn is_core_schema_path(rel: &str) -> bool {
    rel.starts_with("schema/")
}

const SOURCE_EXTENSIONS: [&str; 14] = [
    "c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx", "py", "js", "mjs", "ts", "tsx", "jsx",
];

/// Whether `rel` is a source module (by extension)
#[must_use]
pub fn is_source_module(rel: &str) -> bool {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
}

/// Tags derived from a repo-relative path
#[must_use]
pub fn file_tags(rel: &str) -> BTreeSet<String> {
    let parts: Vec<&str> = rel.split('/').collect();
    let name = parts.last().copied().unwrap_or(rel);
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let dirs = &parts[..parts.len().saturating_sub(1)];

    let mut tags = BTreeSet::new();
    let is_test = dirs
        .iter()
        .any(|d| matches!(*d, "test" | "tests" | "testdata" | "__tests__"))
        || stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with(".test")
        || stem.ends_with(".spec");
    if is_test {
        tags.insert("test".to_string());
    }
    if parts.first() == Some(&"docs") || matches!(ext, "md" | "rst" | "adoc" | "txt") {
        tags.insert("doc".to_string());
    }
    let top_level_script = parts.len() == 2 && matches!(parts[0], "scripts" | "tools");
    let in_bin = dirs.iter().any(|d| *d == "bin");
    if top_level_script
        || in_bin
        || matches!(stem, "main" | "__main__" | "__init__" | "index" | "cli")
    {
        tags.insert("entrypoint".to_string());
    }
    if dirs.iter().any(|d| *d == LEGACY_DIR) {
        tags.insert("legacy".to_string());
    }
    if is_core_schema_path(rel) {
        tags.insert("core-schema".to_string());
    }
    tags
}
