use crate::analyzer::{Analyzer, AnalyzerContext};
use crate::finding::{Classification, Finding, RecommendedAction, Severity};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use walkdir::WalkDir;
use xstack_graph::rel_path;

const ID: &str = "blocker_recurrence";
const RUNLOG_NAME: &str = "RUNLOG.json";

/// Refusal tokens that keep coming back across remediation runlogs
///
/// Remediation directories are excluded from the graph walk, so runlogs are
/// discovered here directly.
#[derive(Debug, Clone)]
pub struct BlockerRecurrenceAnalyzer {
    root: String,
    threshold: usize,
}

impl BlockerRecurrenceAnalyzer {
    /// Report tokens seen in at least `threshold` runs under `root`
    #[must_use]
    pub fn new(root: String, threshold: usize) -> Self {
        Self {
            root,
            threshold: threshold.max(1),
        }
    }
}

/// Distinct refusal tokens recorded in one runlog document
fn runlog_tokens(runlog: &Value) -> BTreeSet<String> {
    let record = runlog.get("record").unwrap_or(runlog);
    let strings = |v: Option<&Value>| {
        v.and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect::<Vec<_>>()
    };

    let mut tokens: BTreeSet<String> = strings(record.get("refusal_tokens")).into_iter().collect();
    let steps = record.get("steps").and_then(Value::as_array);
    for step in steps.into_iter().flatten() {
        tokens.extend(strings(step.get("refusal_tokens")));
    }
    tokens
}

impl Analyzer for BlockerRecurrenceAnalyzer {
    fn id(&self) -> &'static str {
        ID
    }

    fn watch_prefixes(&self) -> Vec<String> {
        vec![self.root.clone()]
    }

    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let base = ctx.repo_root().join(&self.root);
        if !base.is_dir() {
            return Vec::new();
        }

        let mut runs_by_token: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let entries = WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && e.file_name() == RUNLOG_NAME);
        for entry in entries {
            let Some(rel) = rel_path(ctx.repo_root(), entry.path()) else {
                continue;
            };
            let Some(runlog) = ctx.read_json(&rel) else {
                tracing::debug!(path = %rel, "skipping unreadable runlog");
                continue;
            };
            for token in runlog_tokens(&runlog) {
                runs_by_token.entry(token).or_default().insert(rel.clone());
            }
        }

        runs_by_token
            .into_iter()
            .filter(|(_, runs)| runs.len() >= self.threshold)
            .map(|(token, runs)| {
                // Run paths and counts grow with every run; keep them out of
                // the fingerprinted fields.
                tracing::debug!(%token, runs = runs.len(), "recurring blocker");
                Finding::new(ID, "recurring_blocker", Severity::Risk, 0.75, &self.root)
                    .suggest(Classification::TodoBlocked, RecommendedAction::AddRule)
                    .with_evidence(format!("{token} recurred in at least {} runs", self.threshold))
            })
            .collect()
    }
}
