use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use std::collections::BTreeSet;
use xstack_graph::{is_source_module, GraphNode, RepoGraph};

const ID: &str = "reachability";

const TRANSLATION_UNITS: [&str; 4] = ["c", "cc", "cpp", "cxx"];
const HEADERS: [&str; 4] = ["h", "hh", "hpp", "hxx"];

/// Source modules nothing outside tests and docs refers to
///
/// C/C++ translation units are never included, so one counts as referenced
/// when a referenced header with the same stem exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachabilityAnalyzer;

fn split_name(path: &str) -> (&str, &str) {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').unwrap_or((name, ""))
}

fn is_exempt(node: &GraphNode) -> bool {
    ["test", "doc", "entrypoint", "legacy"]
        .iter()
        .any(|tag| node.has_tag(tag))
}

fn referenced(graph: &RepoGraph, node_id: &str) -> bool {
    graph.incoming(node_id).any(|edge| {
        graph
            .node(&edge.src)
            .is_some_and(|src| !src.has_tag("test") && !src.has_tag("doc"))
    })
}

impl Analyzer for ReachabilityAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let graph = ctx.graph();

        let referenced_header_stems: BTreeSet<&str> = graph
            .files()
            .filter_map(|node| node.path().map(|p| (node, p)))
            .filter(|(_, path)| HEADERS.contains(&split_name(path).1))
            .filter(|(node, _)| referenced(graph, &node.node_id))
            .map(|(_, path)| split_name(path).0)
            .collect();

        graph
            .files()
            .filter_map(|node| node.path().map(|p| (node, p)))
            .filter(|(node, path)| is_source_module(path) && !is_exempt(node))
            .filter(|(node, path)| {
                let (stem, ext) = split_name(path);
                let backed_by_header =
                    TRANSLATION_UNITS.contains(&ext) && referenced_header_stems.contains(stem);
                !backed_by_header && !referenced(graph, &node.node_id)
            })
            .map(|(_, path)| {
                Finding::new(ID, "unreferenced_module", Severity::Warn, 0.70, path)
                    .suggest(Classification::Prototype, RecommendedAction::Retire)
                    .with_evidence("no incoming edge from a non-test, non-doc file")
            })
            .collect()
    }
}
