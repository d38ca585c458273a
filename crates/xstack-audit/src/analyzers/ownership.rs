use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use xstack_graph::{EdgeType, NodeType, LEGACY_DIR};

const ID: &str = "ownership_boundary";

/// Dependencies from canonical roots into legacy code
///
/// Legacy directories are usually not walked, so references that failed to
/// resolve but name a legacy path count as well.
#[derive(Debug, Clone)]
pub struct OwnershipBoundaryAnalyzer {
    canonical_roots: Vec<String>,
}

impl OwnershipBoundaryAnalyzer {
    /// Analyzer guarding `canonical_roots`
    #[must_use]
    pub fn new(canonical_roots: Vec<String>) -> Self {
        Self { canonical_roots }
    }

    fn in_canonical_root(&self, path: &str) -> bool {
        let top = path.split('/').next().unwrap_or(path);
        self.canonical_roots.iter().any(|root| root == top)
            && !path.split('/').any(|part| part == LEGACY_DIR)
    }
}

fn names_legacy(target: &str) -> bool {
    target.split(['/', '.', '\\']).any(|part| part == LEGACY_DIR)
}

fn violation(path: &str) -> Finding {
    Finding::new(ID, "legacy_dependency", Severity::Violation, 0.90, path)
        .suggest(Classification::Legacy, RecommendedAction::Quarantine)
}

impl Analyzer for OwnershipBoundaryAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn watch_prefixes(&self) -> Vec<String> {
        let mut prefixes = self.canonical_roots.clone();
        prefixes.push(LEGACY_DIR.to_owned());
        prefixes
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let graph = ctx.graph();
        let mut findings = Vec::new();

        for edge in graph.edges() {
            if !matches!(edge.edge_type, EdgeType::Include | EdgeType::Import) {
                continue;
            }
            let (Some(src), Some(dst)) = (graph.node(&edge.src), graph.node(&edge.dst)) else {
                continue;
            };
            if src.node_type != NodeType::File || !dst.has_tag("legacy") {
                continue;
            }
            let (Some(src_path), Some(dst_path)) = (src.path(), dst.path()) else {
                continue;
            };
            if self.in_canonical_root(src_path) {
                findings.push(
                    violation(src_path)
                        .with_evidence(format!("{} {src_path} -> {dst_path}", edge.edge_type.as_str()))
                        .with_related_path(dst_path),
                );
            }
        }

        for unresolved in graph.unresolved() {
            let Some(src_path) = unresolved.src.strip_prefix("file:") else {
                continue;
            };
            if self.in_canonical_root(src_path) && names_legacy(&unresolved.target) {
                findings.push(
                    violation(src_path)
                        .at_line(unresolved.line)
                        .with_evidence(format!(
                            "{} {src_path} -> {}",
                            unresolved.edge_type.as_str(),
                            unresolved.target
                        )),
                );
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_name_detection() {
        assert!(names_legacy("../../legacy/old.h"));
        assert!(names_legacy("legacy.compat"));
        assert!(!names_legacy("legacyish/x.h"));
    }

    #[test]
    fn canonical_root_excludes_nested_legacy() {
        let a = OwnershipBoundaryAnalyzer::new(vec!["engine".into()]);
        assert!(a.in_canonical_root("engine/src/a.c"));
        assert!(!a.in_canonical_root("engine/legacy/a.c"));
        assert!(!a.in_canonical_root("web/a.ts"));
    }
}
