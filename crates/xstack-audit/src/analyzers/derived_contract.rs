use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use serde_json::Value;
use xstack_canon::{find_forbidden_keys, ArtifactClass, ForbiddenKeys};

const ID: &str = "derived_artifact_contract";

/// CANONICAL artifacts on disk that carry run-meta keys
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedContractAnalyzer;

impl DerivedContractAnalyzer {
    /// Analyzer id, as recorded on its findings
    pub const ID: &'static str = ID;
}

/// Artifact class declared by a JSON document, if any
pub(crate) fn declared_class(value: &Value) -> Option<ArtifactClass> {
    value
        .get("artifact_class")
        .and_then(Value::as_str)
        .and_then(ArtifactClass::parse)
}

impl Analyzer for DerivedContractAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let forbidden = ForbiddenKeys::run_meta();
        let mut findings = Vec::new();
        for path in ctx.files_under("").filter(|p| p.ends_with(".json")) {
            let Some(value) = ctx.read_json(path) else {
                continue;
            };
            if declared_class(&value) != Some(ArtifactClass::Canonical) {
                continue;
            }
            let keys = find_forbidden_keys(&value, &forbidden);
            if keys.is_empty() {
                continue;
            }
            let mut finding =
                Finding::new(ID, "canonical_run_meta", Severity::Violation, 0.98, path)
                    .suggest(Classification::Invalid, RecommendedAction::Rewrite)
                    .with_invariant("canonical_artifacts_exclude_run_meta");
            for key in keys {
                finding = finding.with_evidence(format!("forbidden key {key}"));
            }
            findings.push(finding);
        }
        findings
    }
}
