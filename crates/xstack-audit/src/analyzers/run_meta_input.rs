use super::derived_contract::declared_class;
use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use serde_json::Value;
use xstack_canon::ArtifactClass;

const ID: &str = "run_meta_as_input";

/// RUN_META artifacts that are marked gating/canonical or feed a gate group
#[derive(Debug, Clone)]
pub struct RunMetaInputAnalyzer {
    group_registry: String,
}

impl RunMetaInputAnalyzer {
    /// Analyzer also checking dep roots in `group_registry`
    #[must_use]
    pub fn new(group_registry: String) -> Self {
        Self { group_registry }
    }
}

fn flagged(value: &Value, key: &str) -> bool {
    let truthy = |v: Option<&Value>| v.and_then(Value::as_bool).unwrap_or(false);
    truthy(value.get(key)) || truthy(value.get("extensions").and_then(|e| e.get(key)))
}

impl Analyzer for RunMetaInputAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut run_meta_paths = Vec::new();

        for path in ctx.files_under("").filter(|p| p.ends_with(".json")) {
            let Some(value) = ctx.read_json(path) else {
                continue;
            };
            if declared_class(&value) != Some(ArtifactClass::RunMeta) {
                continue;
            }
            run_meta_paths.push(path);
            for marker in ["gating", "canonical"] {
                if flagged(&value, marker) {
                    findings.push(
                        Finding::new(ID, "run_meta_marked_gating", Severity::Violation, 0.95, path)
                            .suggest(Classification::Invalid, RecommendedAction::Rewrite)
                            .with_evidence(format!("RUN_META artifact marked {marker}")),
                    );
                }
            }
        }

        let Some(registry) = ctx.read_json(&self.group_registry) else {
            return findings;
        };
        let groups = registry.get("groups").and_then(Value::as_array);
        for group in groups.into_iter().flatten() {
            let group_id = group.get("group_id").and_then(Value::as_str).unwrap_or("<unnamed>");
            let dep_roots = group.get("dep_roots").and_then(Value::as_array);
            for root in dep_roots.into_iter().flatten().filter_map(Value::as_str) {
                let root = root.trim_end_matches('/');
                let hits = run_meta_paths
                    .iter()
                    .filter(|p| crate::analyzer::under_prefix(p, root));
                for hit in hits {
                    findings.push(
                        Finding::new(ID, "run_meta_dependency", Severity::Violation, 0.95, &self.group_registry)
                            .suggest(Classification::Invalid, RecommendedAction::Rewrite)
                            .with_evidence(format!("group {group_id} depends on RUN_META artifact {hit}"))
                            .with_related_path(*hit),
                    );
                }
            }
        }
        findings
    }
}
