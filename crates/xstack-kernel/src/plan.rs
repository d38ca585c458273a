//! Plan composition
//!
//! A plan is the DAG of check groups selected for one profile, layered
//! topologically. Groups in one layer have no dependencies on each other and
//! run concurrently; layers are barriers.

use crate::error::{KernelError, KernelResult};
use crate::group::{CheckGroup, GroupRegistry};
use crate::profile::Profile;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use xstack_canon::canonical_sha256;

/// Suite dropped when `DOM_XSTACK_SKIP_TESTX` is set
pub const TESTX_SUITE: &str = "testx";

/// What to plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    /// Profile
    pub profile: Profile,
    /// Restrict to these groups and their transitive deps
    pub only_gate: Vec<String>,
    /// Drop the `testx` suite
    pub skip_testx: bool,
}

impl PlanRequest {
    /// Full plan for `profile`
    #[must_use]
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            only_gate: Vec::new(),
            skip_testx: false,
        }
    }

    /// Restrict to `gates`
    #[must_use]
    pub fn with_only_gate(mut self, gates: Vec<String>) -> Self {
        self.only_gate = gates;
        self
    }

    /// Drop the `testx` suite
    #[must_use]
    pub fn with_skip_testx(mut self, skip: bool) -> Self {
        self.skip_testx = skip;
        self
    }
}

/// One scheduled group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    /// `<group_id>@<PROFILE>`
    pub node_id: String,
    /// Executable the group runs
    pub runner_id: String,
    /// Group id
    pub group_id: String,
    /// Planned dependencies, sorted
    pub deps: Vec<String>,
    /// Topological layer, starting at 0
    pub layer: usize,
}

/// Layered execution plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Profile
    pub profile: Profile,
    /// Canonical hash of `{profile, nodes}`
    pub plan_hash: String,
    /// Nodes sorted by `(layer, group_id)`
    pub nodes: Vec<PlanNode>,
}

impl Plan {
    /// Nodes grouped by layer
    #[must_use]
    pub fn layers(&self) -> Vec<Vec<&PlanNode>> {
        let mut layers: Vec<Vec<&PlanNode>> = Vec::new();
        for node in &self.nodes {
            if layers.len() <= node.layer {
                layers.resize_with(node.layer + 1, Vec::new);
            }
            layers[node.layer].push(node);
        }
        layers
    }

    /// Planned group ids in plan order
    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.group_id.as_str())
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nothing to run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Runlog payload
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({
            "profile": self.profile,
            "plan_hash": self.plan_hash,
            "nodes": self.nodes,
        })
    }
}

fn select<'r>(registry: &'r GroupRegistry, request: &PlanRequest) -> KernelResult<BTreeMap<&'r str, &'r CheckGroup>> {
    if request.only_gate.is_empty() {
        return Ok(registry
            .iter()
            .filter(|g| g.runs_in(request.profile))
            .filter(|g| !(request.skip_testx && g.suite() == TESTX_SUITE))
            .map(|g| (g.group_id.as_str(), g))
            .collect());
    }

    let mut selected = BTreeMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for gate in &request.only_gate {
        let group = registry
            .get(gate)
            .ok_or_else(|| KernelError::UnknownGate(gate.clone()))?;
        queue.push_back(group.group_id.as_str());
    }
    while let Some(id) = queue.pop_front() {
        let Some(group) = registry.get(id) else {
            continue;
        };
        if selected.insert(group.group_id.as_str(), group).is_none() {
            queue.extend(group.deps.iter().map(String::as_str));
        }
    }
    Ok(selected)
}

/// Compose the plan for `request`
///
/// # Errors
/// [`KernelError::UnknownGate`] for unregistered `only_gate` names,
/// [`KernelError::Cycle`] when group dependencies are cyclic
pub fn compose_plan(registry: &GroupRegistry, request: &PlanRequest) -> KernelResult<Plan> {
    let selected = select(registry, request)?;

    let mut dag: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (&id, group) in &selected {
        dag.add_node(id);
        for dep in group.deps.iter().filter(|d| selected.contains_key(d.as_str())) {
            dag.add_edge(dep.as_str(), id, ());
        }
    }
    let order = toposort(&dag, None).map_err(|cycle| KernelError::Cycle(cycle.node_id().to_owned()))?;

    let mut layers: BTreeMap<&str, usize> = BTreeMap::new();
    for id in order {
        let layer = dag
            .neighbors_directed(id, petgraph::Direction::Incoming)
            .filter_map(|dep| layers.get(dep))
            .map(|l| l + 1)
            .max()
            .unwrap_or(0);
        layers.insert(id, layer);
    }

    let mut nodes: Vec<PlanNode> = selected
        .iter()
        .map(|(&id, group)| {
            let deps: BTreeSet<String> = group
                .deps
                .iter()
                .filter(|d| selected.contains_key(d.as_str()))
                .cloned()
                .collect();
            PlanNode {
                node_id: format!("{id}@{}", request.profile),
                runner_id: group.runner_id().to_owned(),
                group_id: id.to_owned(),
                deps: deps.into_iter().collect(),
                layer: layers.get(id).copied().unwrap_or(0),
            }
        })
        .collect();
    nodes.sort_by(|a, b| (a.layer, &a.group_id).cmp(&(b.layer, &b.group_id)));

    let plan_hash = canonical_sha256(&json!({
        "profile": request.profile,
        "nodes": nodes,
    }))
    .to_hex();
    tracing::info!(
        profile = %request.profile,
        groups = nodes.len(),
        plan_hash = %plan_hash,
        "plan composed"
    );
    Ok(Plan {
        profile: request.profile,
        plan_hash,
        nodes,
    })
}
