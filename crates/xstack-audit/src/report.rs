//! Findings report and diff
//!
//! The report is the CANONICAL AuditX artifact. Diffing two reports by
//! `finding_id` gives the added/resolved/persisting view used for trends.

use crate::analyzer::sort_findings;
use crate::error::{AuditError, AuditResult};
use crate::finding::{Finding, FindingStatus};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use xstack_canon::CanonicalArtifact;

/// Schema id of the findings artifact
pub const FINDINGS_SCHEMA_ID: &str = "xstack.auditx.findings";

/// Schema version of the findings artifact
pub const FINDINGS_SCHEMA_VERSION: &str = "1.0.0";

/// Sorted findings of one audit run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingsReport {
    findings: Vec<Finding>,
}

impl FindingsReport {
    /// Report over `findings`; ids are assigned where missing and order normalized
    #[must_use]
    pub fn new(mut findings: Vec<Finding>) -> Self {
        for finding in &mut findings {
            if finding.finding_id.is_empty() {
                finding.assign_id();
            }
        }
        sort_findings(&mut findings);
        findings.dedup_by(|a, b| a.finding_id == b.finding_id);
        Self { findings }
    }

    /// Findings in report order
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Number of findings
    #[must_use]
    pub fn len(&self) -> usize {
        self.findings.len()
    }

    /// No findings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Mark findings matching `covered` as DEFERRED; returns how many changed
    pub fn defer_where<F>(&mut self, mut covered: F) -> usize
    where
        F: FnMut(&Finding) -> bool,
    {
        let mut changed = 0;
        for finding in &mut self.findings {
            if finding.status != FindingStatus::Deferred && covered(finding) {
                finding.status = FindingStatus::Deferred;
                changed += 1;
            }
        }
        changed
    }

    /// Open findings at or above VIOLATION
    pub fn open_violations(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| {
            f.status == FindingStatus::Open && f.severity == crate::finding::Severity::Violation
        })
    }

    fn summary(&self) -> Value {
        let mut by_severity: BTreeMap<&str, usize> = BTreeMap::new();
        let mut by_analyzer: BTreeMap<&str, usize> = BTreeMap::new();
        for finding in &self.findings {
            *by_severity.entry(finding.severity.as_str()).or_default() += 1;
            *by_analyzer.entry(finding.analyzer_id.as_str()).or_default() += 1;
        }
        json!({
            "total": self.findings.len(),
            "by_severity": by_severity,
            "by_analyzer": by_analyzer,
        })
    }

    /// CANONICAL envelope for this report
    #[must_use]
    pub fn to_artifact(&self) -> CanonicalArtifact {
        let findings = serde_json::to_value(&self.findings).unwrap_or_else(|_| json!([]));
        CanonicalArtifact::canonical(
            FINDINGS_SCHEMA_ID,
            FINDINGS_SCHEMA_VERSION,
            json!({
                "findings": findings,
                "summary": self.summary(),
            }),
        )
    }

    /// Decode a report from its envelope
    ///
    /// # Errors
    /// Wrong schema id or a record that does not decode
    pub fn from_artifact(artifact: &CanonicalArtifact) -> AuditResult<Self> {
        if artifact.schema_id != FINDINGS_SCHEMA_ID {
            return Err(AuditError::SchemaMismatch {
                expected: FINDINGS_SCHEMA_ID.to_owned(),
                found: artifact.schema_id.clone(),
            });
        }
        let findings = artifact
            .record
            .get("findings")
            .cloned()
            .unwrap_or_else(|| json!([]));
        let findings: Vec<Finding> = serde_json::from_value(findings)?;
        Ok(Self::new(findings))
    }

    /// Load a previously written report; `Ok(None)` if the file does not exist
    ///
    /// # Errors
    /// Unreadable file or malformed artifact
    pub fn load(path: &Path) -> AuditResult<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AuditError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let artifact = CanonicalArtifact::from_slice(&bytes)?;
        Self::from_artifact(&artifact).map(Some)
    }
}

/// Finding ids grouped by how they changed between two reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FindingsDiff {
    /// Only in the current report
    pub added: Vec<String>,
    /// Only in the previous report
    pub resolved: Vec<String>,
    /// In both
    pub persisting: Vec<String>,
}

impl FindingsDiff {
    /// Nothing added or resolved
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.added.is_empty() && self.resolved.is_empty()
    }
}

/// Compare two finding sets by `finding_id`
#[must_use]
pub fn diff_findings(previous: &[Finding], current: &[Finding]) -> FindingsDiff {
    let ids = |findings: &[Finding]| -> BTreeSet<String> {
        findings
            .iter()
            .map(|f| {
                if f.finding_id.is_empty() {
                    f.fingerprint()
                } else {
                    f.finding_id.clone()
                }
            })
            .collect()
    };
    let before = ids(previous);
    let after = ids(current);
    FindingsDiff {
        added: after.difference(&before).cloned().collect(),
        resolved: before.difference(&after).cloned().collect(),
        persisting: before.intersection(&after).cloned().collect(),
    }
}
