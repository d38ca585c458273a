//! Analyzer trait and registry
//!
//! Analyzers are pure: they read the shared [`RepoGraph`] and repository
//! files and return findings. The registry owns ordering, incremental
//! selection, fingerprinting and dedup so every analyzer stays simple.

use crate::finding::Finding;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xstack_graph::RepoGraph;

/// Inputs shared by every analyzer in one run
#[derive(Debug, Clone)]
pub struct AnalyzerContext {
    repo_root: PathBuf,
    graph: Arc<RepoGraph>,
    changed_files: Option<Vec<String>>,
}

impl AnalyzerContext {
    /// Context over a built graph
    pub fn new(repo_root: impl Into<PathBuf>, graph: Arc<RepoGraph>) -> Self {
        Self {
            repo_root: repo_root.into(),
            graph,
            changed_files: None,
        }
    }

    /// Restrict to a changed-file set (incremental mode)
    #[must_use]
    pub fn with_changed_files(mut self, files: Option<Vec<String>>) -> Self {
        self.changed_files = files.map(|mut f| {
            f.sort();
            f.dedup();
            f
        });
        self
    }

    /// Repository root
    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Shared graph
    #[must_use]
    pub fn graph(&self) -> &RepoGraph {
        &self.graph
    }

    /// Changed files, when known
    #[must_use]
    pub fn changed_files(&self) -> Option<&[String]> {
        self.changed_files.as_deref()
    }

    /// Read a repo-relative file as UTF-8 (lossy); `None` when unreadable
    #[must_use]
    pub fn read_text(&self, rel: &str) -> Option<String> {
        let bytes = std::fs::read(self.repo_root.join(rel)).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read and parse a repo-relative JSON file
    #[must_use]
    pub fn read_json(&self, rel: &str) -> Option<serde_json::Value> {
        let bytes = std::fs::read(self.repo_root.join(rel)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Graph file paths under `prefix`, sorted
    pub fn files_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.graph
            .files()
            .filter_map(|node| node.path())
            .filter(move |path| under_prefix(path, prefix))
    }
}

/// `path` equals `prefix` or lies beneath it; the empty prefix matches all
#[must_use]
pub fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Structural or semantic analyzer
pub trait Analyzer: Send + Sync {
    /// Stable identifier, used as `analyzer_id` on findings
    fn id(&self) -> &'static str;

    /// Path prefixes whose changes make this analyzer relevant
    ///
    /// The empty prefix watches the whole tree.
    fn watch_prefixes(&self) -> Vec<String> {
        vec![String::new()]
    }

    /// Produce findings; must not mutate the repository
    fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding>;
}

/// Analyzers in registration order
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("analyzers", &self.ids())
            .finish()
    }
}

impl AnalyzerRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an analyzer; order of registration is preserved
    pub fn register<A: Analyzer + 'static>(&mut self, analyzer: A) {
        self.analyzers.push(Box::new(analyzer));
    }

    /// Builder form of [`Self::register`]
    #[must_use]
    pub fn with<A: Analyzer + 'static>(mut self, analyzer: A) -> Self {
        self.register(analyzer);
        self
    }

    /// Registered ids in order
    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.id()).collect()
    }

    /// Number of analyzers
    #[must_use]
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    /// No analyzers registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Analyzers selected for `ctx`
    ///
    /// With no changed-file list every analyzer runs. Otherwise only those
    /// with a watch prefix covering at least one changed file.
    #[must_use]
    pub fn selected(&self, ctx: &AnalyzerContext) -> Vec<&dyn Analyzer> {
        self.analyzers
            .iter()
            .map(AsRef::as_ref)
            .filter(|a| match ctx.changed_files() {
                None => true,
                Some(changed) => {
                    let prefixes = a.watch_prefixes();
                    changed
                        .iter()
                        .any(|file| prefixes.iter().any(|p| under_prefix(file, p)))
                }
            })
            .collect()
    }

    /// Run the selected analyzers
    ///
    /// Analyzers run in parallel; the result is fingerprinted, deduplicated
    /// by `finding_id` and sorted, so it does not depend on scheduling.
    #[must_use]
    pub fn run(&self, ctx: &AnalyzerContext) -> Vec<Finding> {
        let selected = self.selected(ctx);
        tracing::debug!(
            analyzers = selected.len(),
            incremental = ctx.changed_files().is_some(),
            "running analyzers"
        );

        let batches: Vec<Vec<Finding>> = selected
            .par_iter()
            .map(|analyzer| {
                let mut findings = analyzer.run(ctx);
                for finding in &mut findings {
                    analyzer.id().clone_into(&mut finding.analyzer_id);
                    finding.assign_id();
                }
                tracing::trace!(analyzer = analyzer.id(), count = findings.len(), "analyzer done");
                findings
            })
            .collect();

        let mut unique: BTreeMap<String, Finding> = BTreeMap::new();
        for finding in batches.into_iter().flatten() {
            unique.entry(finding.finding_id.clone()).or_insert(finding);
        }
        let mut findings: Vec<Finding> = unique.into_values().collect();
        sort_findings(&mut findings);
        findings
    }
}

/// Sort by `(analyzer_id, category, severity, file, finding_id)`
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// 1-based line numbers of `text` lines matching `pred`
pub(crate) fn matching_lines<'a, F>(text: &'a str, mut pred: F) -> impl Iterator<Item = (u32, &'a str)> + 'a
where
    F: FnMut(&str) -> bool + 'a,
{
    text.lines().enumerate().filter_map(move |(i, line)| {
        pred(line).then(|| (u32::try_from(i + 1).unwrap_or(u32::MAX), line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;
    use pretty_assertions::assert_eq;

    struct Fixed {
        id: &'static str,
        prefix: &'static str,
        files: Vec<&'static str>,
    }

    impl Analyzer for Fixed {
        fn id(&self) -> &'static str {
            self.id
        }

        fn watch_prefixes(&self) -> Vec<String> {
            vec![self.prefix.to_owned()]
        }

        fn run(&self, _ctx: &AnalyzerContext) -> Vec<Finding> {
            self.files
                .iter()
                .map(|f| Finding::new(self.id, "cat", Severity::Warn, 0.5, *f))
                .collect()
        }
    }

    fn ctx() -> AnalyzerContext {
        let graph = RepoGraph::from_parts(Vec::new(), Vec::new(), Vec::new()).unwrap();
        AnalyzerContext::new("/nonexistent", Arc::new(graph))
    }

    fn registry() -> AnalyzerRegistry {
        AnalyzerRegistry::new()
            .with(Fixed { id: "zeta", prefix: "docs", files: vec!["docs/b.md", "docs/a.md"] })
            .with(Fixed { id: "alpha", prefix: "src", files: vec!["src/x.c", "src/x.c"] })
    }

    #[test]
    fn prefix_matching() {
        assert!(under_prefix("docs/a.md", "docs"));
        assert!(under_prefix("docs/a.md", "docs/"));
        assert!(under_prefix("anything", ""));
        assert!(!under_prefix("docsx/a.md", "docs"));
    }

    #[test]
    fn output_is_sorted_and_deduplicated() {
        let findings = registry().run(&ctx());
        let keys: Vec<(&str, &str)> = findings
            .iter()
            .map(|f| (f.analyzer_id.as_str(), f.location.file.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("alpha", "src/x.c"), ("zeta", "docs/a.md"), ("zeta", "docs/b.md")]
        );
        assert!(findings.iter().all(|f| f.finding_id.len() == 64));
    }

    #[test]
    fn incremental_selection() {
        let reg = registry();
        let c = ctx().with_changed_files(Some(vec!["src/x.c".into()]));
        assert_eq!(
            reg.selected(&c).iter().map(|a| a.id()).collect::<Vec<_>>(),
            vec!["alpha"]
        );
        let none = ctx().with_changed_files(Some(Vec::new()));
        assert!(reg.run(&none).is_empty());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let reg = registry();
        assert_eq!(reg.run(&ctx()), reg.run(&ctx()));
    }
}
