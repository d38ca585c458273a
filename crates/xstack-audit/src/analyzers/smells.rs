use crate::analyzer::{matching_lines, Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use xstack_graph::is_source_module;

const ID: &str = "semantic_smells";

static MODE_FLAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:if|elif|else if|when|while)\b.*\b(?:debug_mode|dev_mode|god_mode|cheat_mode|test_mode|is_dev|is_debug)\b",
    )
    .expect("static regex is valid")
});

static AUTHORITY_BYPASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:skip_auth\w*|bypass_auth\w*|no_authority_check|force_allow|allow_all_authority|authority\s*=\s*(?:None|null|nullptr))\b",
    )
    .expect("static regex is valid")
});

/// Hard-coded mode branches, authority bypasses and deprecated terminology
#[derive(Debug, Clone)]
pub struct SemanticSmellAnalyzer {
    terms: BTreeMap<String, String>,
    terminology: Option<Regex>,
    authority_context: Option<String>,
}

impl SemanticSmellAnalyzer {
    /// Analyzer flagging `terms` (deprecated → preferred)
    #[must_use]
    pub fn new(terms: BTreeMap<String, String>, authority_context: Option<String>) -> Self {
        let terms: BTreeMap<String, String> = terms
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        let terminology = (!terms.is_empty())
            .then(|| {
                let alternation = terms
                    .keys()
                    .map(|t| regex::escape(t))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok()
            })
            .flatten();
        Self {
            terms,
            terminology,
            authority_context,
        }
    }

    fn scan_code(&self, path: &str, text: &str, findings: &mut Vec<Finding>) {
        for (line_no, _) in matching_lines(text, |l| MODE_FLAG.is_match(l)) {
            findings.push(
                Finding::new(ID, "mode_flag", Severity::Warn, 0.55, path)
                    .at_line(line_no)
                    .suggest(Classification::Prototype, RecommendedAction::Rewrite)
                    .with_evidence("behavior branches on a hard-coded mode flag"),
            );
        }
        for (line_no, line) in matching_lines(text, |l| AUTHORITY_BYPASS.is_match(l)) {
            let fragment = AUTHORITY_BYPASS.find(line).map_or("", |m| m.as_str());
            let mut finding = Finding::new(ID, "authority_bypass", Severity::Risk, 0.55, path)
                .at_line(line_no)
                .suggest(Classification::Invalid, RecommendedAction::Rewrite)
                .with_evidence(format!("authority check bypassed: {fragment}"));
            if let Some(context) = &self.authority_context {
                finding = finding.with_evidence(format!("authority_context {context}"));
            }
            findings.push(finding);
        }
    }

    fn scan_terms(&self, path: &str, text: &str, findings: &mut Vec<Finding>) {
        let Some(re) = &self.terminology else {
            return;
        };
        for (line_no, line) in matching_lines(text, |l| re.is_match(l)) {
            let Some(found) = re.find(line).map(|m| m.as_str().to_lowercase()) else {
                continue;
            };
            let preferred = self.terms.get(&found).map_or("", String::as_str);
            findings.push(
                Finding::new(ID, "terminology_misuse", Severity::Info, 0.55, path)
                    .at_line(line_no)
                    .suggest(Classification::Canonical, RecommendedAction::DocFix)
                    .with_evidence(format!("use \"{preferred}\" instead of \"{found}\"")),
            );
        }
    }
}

impl Analyzer for SemanticSmellAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        let candidates = ctx
            .graph()
            .files()
            .filter(|node| !node.has_tag("test") && !node.has_tag("legacy"));
        for node in candidates {
            let Some(path) = node.path() else {
                continue;
            };
            let is_code = is_source_module(path);
            let is_doc = node.has_tag("doc") && path.ends_with(".md");
            if !is_code && !is_doc {
                continue;
            }
            let Some(text) = ctx.read_text(path) else {
                continue;
            };
            if is_code {
                self.scan_code(path, &text, &mut findings);
            }
            self.scan_terms(path, &text, &mut findings);
        }
        findings
    }
}
