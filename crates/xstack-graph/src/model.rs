//! Graph data model
//!
//! Nodes and edges are stored as sorted arrays plus two index maps
//! (`by_id`, `edges_by_src`). Traversals are iterative with visited sets.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use xstack_canon::{canonical_sha256, ContentDigest};

/// Kind of node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A file in the tree (`file:<rel>`)
    File,
    /// A pack declared by a `pack.json` manifest (`pack:<id>`)
    Pack,
    /// A declared schema (`schema:<id>`)
    Schema,
}

/// Kind of edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// C/C++ `#include`
    Include,
    /// Script import
    Import,
    /// Pack requires another pack or schema
    Requires,
    /// Declaration: file provides a pack or schema; pack provides a schema
    Provides,
    /// Schema reference from a data file
    References,
}

impl EdgeType {
    /// Wire token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Import => "import",
            Self::Requires => "requires",
            Self::Provides => "provides",
            Self::References => "references",
        }
    }
}

/// Node id for a repo-relative file path
#[must_use]
pub fn file_id(rel: &str) -> String {
    format!("file:{rel}")
}

/// Node id for a pack
#[must_use]
pub fn pack_id(id: &str) -> String {
    format!("pack:{id}")
}

/// Node id for a schema
#[must_use]
pub fn schema_id(id: &str) -> String {
    format!("schema:{id}")
}

/// Graph node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// `file:<rel>`, `pack:<id>` or `schema:<id>`
    pub node_id: String,
    /// Kind
    pub node_type: NodeType,
    /// Human label (path or declared id)
    pub label: String,
    /// Content digest (file nodes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Sorted tags: `test`, `doc`, `entrypoint`, `legacy`, `core-schema`
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl GraphNode {
    /// Whether the node carries `tag`
    #[inline]
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Repo-relative path for file nodes
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.node_id.strip_prefix("file:")
    }
}

/// Graph edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node id
    pub src: String,
    /// Destination node id
    pub dst: String,
    /// Kind
    pub edge_type: EdgeType,
}

/// A reference that could not be resolved to a node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnresolvedRef {
    /// Referencing node id
    pub src: String,
    /// Raw target text
    pub target: String,
    /// Kind of reference
    pub edge_type: EdgeType,
    /// 1-based line, 0 when not line-oriented
    pub line: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphDoc {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    unresolved: Vec<UnresolvedRef>,
}

/// Immutable repository graph
#[derive(Debug, Clone, Default)]
pub struct RepoGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    unresolved: Vec<UnresolvedRef>,
    by_id: HashMap<String, usize>,
    edges_by_src: HashMap<String, Vec<usize>>,
    edges_by_dst: HashMap<String, Vec<usize>>,
}

impl PartialEq for RepoGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges && self.unresolved == other.unresolved
    }
}

impl Eq for RepoGraph {}

impl RepoGraph {
    /// Assemble a graph; sorts and deduplicates, then checks closure
    ///
    /// # Errors
    /// [`GraphError::DanglingEdge`] if an edge endpoint is not a node
    pub fn from_parts(
        mut nodes: Vec<GraphNode>,
        mut edges: Vec<GraphEdge>,
        mut unresolved: Vec<UnresolvedRef>,
    ) -> GraphResult<Self> {
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes.dedup_by(|a, b| a.node_id == b.node_id);
        edges.sort();
        edges.dedup();
        unresolved.sort();
        unresolved.dedup();

        let by_id: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.node_id.clone(), idx))
            .collect();

        let mut edges_by_src: HashMap<String, Vec<usize>> = HashMap::new();
        let mut edges_by_dst: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            for end in [&edge.src, &edge.dst] {
                if !by_id.contains_key(end) {
                    return Err(GraphError::DanglingEdge {
                        src: edge.src.clone(),
                        dst: edge.dst.clone(),
                    });
                }
            }
            edges_by_src.entry(edge.src.clone()).or_default().push(idx);
            edges_by_dst.entry(edge.dst.clone()).or_default().push(idx);
        }

        Ok(Self {
            nodes,
            edges,
            unresolved,
            by_id,
            edges_by_src,
            edges_by_dst,
        })
    }

    /// Sorted nodes
    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Sorted edges
    #[must_use]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Sorted unresolved references
    #[must_use]
    pub fn unresolved(&self) -> &[UnresolvedRef] {
        &self.unresolved
    }

    /// Look up a node
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.by_id.get(node_id).map(|&idx| &self.nodes[idx])
    }

    /// Look up a file node by repo-relative path
    #[must_use]
    pub fn file(&self, rel: &str) -> Option<&GraphNode> {
        self.node(&file_id(rel))
    }

    /// Whether a node exists
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.by_id.contains_key(node_id)
    }

    /// Outgoing edges of `node_id`
    pub fn outgoing<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges_by_src
            .get(node_id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Incoming edges of `node_id`
    pub fn incoming<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges_by_dst
            .get(node_id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// File nodes in path order
    pub fn files(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.node_type == NodeType::File)
    }

    /// Nodes reachable from `roots` (roots included), sorted
    #[must_use]
    pub fn reachable_from<'a, I>(&self, roots: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for root in roots {
            if let Some(&idx) = self.by_id.get(root) {
                let id = self.nodes[idx].node_id.as_str();
                if visited.insert(id) {
                    queue.push_back(id);
                }
            }
        }
        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(current) {
                if visited.insert(edge.dst.as_str()) {
                    queue.push_back(edge.dst.as_str());
                }
            }
        }
        visited.into_iter().map(str::to_string).collect()
    }

    /// Every edge endpoint is a node
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.edges
            .iter()
            .all(|e| self.by_id.contains_key(&e.src) && self.by_id.contains_key(&e.dst))
    }

    /// Untyped form, stable across runs
    #[must_use]
    pub fn to_value(&self) -> Value {
        let doc = GraphDoc {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            unresolved: self.unresolved.clone(),
        };
        serde_json::to_value(doc).unwrap_or(Value::Null)
    }

    /// Decode from [`Self::to_value`] output
    ///
    /// # Errors
    /// Decode failures and dangling edges
    pub fn from_value(value: Value) -> GraphResult<Self> {
        let doc: GraphDoc = serde_json::from_value(value)?;
        Self::from_parts(doc.nodes, doc.edges, doc.unresolved)
    }

    /// Canonical hash of the sorted graph
    #[must_use]
    pub fn fingerprint(&self) -> ContentDigest {
        canonical_sha256(&self.to_value())
    }
}
