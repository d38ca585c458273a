use crate::analyzer::{matching_lines, under_prefix, Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};

const ID: &str = "prompt_drift";

/// Governance and prompt documents that tell readers to bypass gates
#[derive(Debug, Clone)]
pub struct PromptDriftAnalyzer {
    prefixes: Vec<String>,
    tokens: Vec<String>,
}

impl PromptDriftAnalyzer {
    /// Analyzer over `prefixes`, matching `tokens` case-insensitively
    #[must_use]
    pub fn new(prefixes: Vec<String>, tokens: Vec<String>) -> Self {
        let tokens = tokens.into_iter().map(|t| t.to_lowercase()).collect();
        Self { prefixes, tokens }
    }

    fn is_governance_doc(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.prefixes.iter().any(|p| under_prefix(path, p))
            || (name.contains("PROMPT") && name.ends_with(".md"))
    }
}

impl Analyzer for PromptDriftAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn watch_prefixes(&self) -> Vec<String> {
        // prompt files may live anywhere
        vec![String::new()]
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        for path in ctx.files_under("").filter(|p| self.is_governance_doc(p)) {
            let Some(text) = ctx.read_text(path) else {
                continue;
            };
            for (line_no, line) in matching_lines(&text, |_| true) {
                let lower = line.to_lowercase();
                for token in self.tokens.iter().filter(|t| lower.contains(t.as_str())) {
                    findings.push(
                        Finding::new(ID, "bypass_token", Severity::Risk, 0.80, path)
                            .at_line(line_no)
                            .suggest(Classification::Invalid, RecommendedAction::DocFix)
                            .with_evidence(format!("bypass token \"{token}\"")),
                    );
                }
            }
        }
        findings
    }
}
