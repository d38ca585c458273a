use crate::analyzer::{matching_lines, under_prefix, Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use once_cell::sync::Lazy;
use regex::Regex;

const ID: &str = "workspace_contamination";

static HOST_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:/home/[A-Za-z0-9_.-]+|/Users/[A-Za-z0-9_.-]+|\b[A-Za-z]:\\\\?[A-Za-z])")
        .expect("static regex is valid")
});

static SHARED_OUTPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:out/build|out/verify|dist)/([A-Za-z0-9_.-]+)").expect("static regex is valid")
});

/// Developer scripts hard-coding host paths or shared, non-workspace outputs
#[derive(Debug, Clone)]
pub struct WorkspaceContaminationAnalyzer {
    prefixes: Vec<String>,
}

impl WorkspaceContaminationAnalyzer {
    /// Analyzer over scripts under `prefixes`
    #[must_use]
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }
}

/// Offending fragment of `line`, if any
fn contamination(line: &str) -> Option<String> {
    if let Some(m) = HOST_PATH.find(line) {
        return Some(m.as_str().to_owned());
    }
    SHARED_OUTPUT
        .captures_iter(line)
        .find(|caps| caps.get(1).is_some_and(|seg| seg.as_str() != "ws"))
        .and_then(|caps| caps.get(0))
        .map(|m| m.as_str().to_owned())
}

impl Analyzer for WorkspaceContaminationAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn watch_prefixes(&self) -> Vec<String> {
        self.prefixes.clone()
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let graph = ctx.graph();
        let mut findings = Vec::new();
        let scripts = graph
            .files()
            .filter(|node| !node.has_tag("test") && !node.has_tag("doc"))
            .filter_map(|node| node.path())
            .filter(|path| self.prefixes.iter().any(|p| under_prefix(path, p)));

        for path in scripts {
            let Some(text) = ctx.read_text(path) else {
                continue;
            };
            for (line_no, line) in matching_lines(&text, |l| contamination(l).is_some()) {
                let fragment = contamination(line).unwrap_or_default();
                findings.push(
                    Finding::new(ID, "hardcoded_path", Severity::Warn, 0.60, path)
                        .at_line(line_no)
                        .suggest(Classification::Invalid, RecommendedAction::Rewrite)
                        .with_evidence(format!("non-workspace path {fragment}")),
                );
            }
        }
        findings
    }
}
