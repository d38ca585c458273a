use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use xstack_graph::{EdgeType, NodeType};

const ID: &str = "schema_usage";

/// Duplicate schema ids and non-core declarations shadowing core schemas
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaUsageAnalyzer;

impl Analyzer for SchemaUsageAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let graph = ctx.graph();
        let mut findings = Vec::new();

        for schema in graph.nodes().iter().filter(|n| n.node_type == NodeType::Schema) {
            let mut core = Vec::new();
            let mut other = Vec::new();
            for edge in graph.incoming(&schema.node_id) {
                if edge.edge_type != EdgeType::Provides {
                    continue;
                }
                let Some(src) = graph.node(&edge.src) else {
                    continue;
                };
                let Some(path) = src.path() else {
                    continue;
                };
                if src.has_tag("core-schema") {
                    core.push(path);
                } else {
                    other.push(path);
                }
            }
            core.sort_unstable();
            other.sort_unstable();

            if !core.is_empty() && !other.is_empty() {
                for path in &other {
                    let mut finding =
                        Finding::new(ID, "schema_shadowing", Severity::Risk, 0.75, *path)
                            .suggest(Classification::Invalid, RecommendedAction::Rewrite)
                            .with_evidence(format!(
                                "schema_id {} is owned by a core schema",
                                schema.label
                            ));
                    for owner in &core {
                        finding = finding.with_related_path(*owner);
                    }
                    findings.push(finding);
                }
                continue;
            }

            let declaring: Vec<&str> = core.into_iter().chain(other).collect();
            if let Some((first, rest)) = declaring.split_first() {
                if rest.is_empty() {
                    continue;
                }
                let mut finding =
                    Finding::new(ID, "duplicate_schema_id", Severity::Warn, 0.80, *first)
                        .suggest(Classification::Superseded, RecommendedAction::Rewrite)
                        .with_evidence(format!(
                            "schema_id {} declared by {} files",
                            schema.label,
                            declaring.len()
                        ));
                for path in rest {
                    finding = finding.with_related_path(*path);
                }
                findings.push(finding);
            }
        }
        findings
    }
}
