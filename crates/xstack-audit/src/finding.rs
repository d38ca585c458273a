//! Finding model
//!
//! A finding is one analyzer observation. Its `finding_id` is the canonical
//! SHA-256 of the finding itself with `finding_id` and `status` removed, so
//! re-running an analyzer on an unchanged tree reproduces the same ids and
//! review state never changes identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use xstack_canon::canonical_sha256;

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational
    Info,
    /// Should be looked at
    Warn,
    /// Likely problem
    Risk,
    /// Contract broken
    Violation,
}

impl Severity {
    /// Wire token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Risk => "RISK",
            Self::Violation => "VIOLATION",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    /// New
    #[default]
    Open,
    /// Acknowledged
    Ack,
    /// Fixed
    Resolved,
    /// Waived by an active override
    Deferred,
}

/// Suggested classification of the located artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Authoritative
    #[serde(rename = "CANONICAL")]
    Canonical,
    /// Replaced by something else
    #[serde(rename = "SUPERSEDED")]
    Superseded,
    /// Experimental
    #[serde(rename = "PROTOTYPE")]
    Prototype,
    /// Legacy code
    #[serde(rename = "LEGACY")]
    Legacy,
    /// Wrong
    #[serde(rename = "INVALID")]
    Invalid,
    /// Waiting on other work
    #[serde(rename = "TODO-BLOCKED")]
    TodoBlocked,
}

/// Recommended follow-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    /// Leave as is
    Keep,
    /// Remove
    Retire,
    /// Rework
    Rewrite,
    /// Isolate
    Quarantine,
    /// Cover with a test
    AddTest,
    /// Cover with a rule
    AddRule,
    /// Fix documentation
    DocFix,
}

/// Location of a finding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Location {
    /// Repo-relative file
    pub file: String,
    /// 1-based start line (0 when not line-oriented)
    pub line: u32,
    /// 1-based end line
    pub end_line: u32,
}

/// Analyzer observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Producing analyzer
    pub analyzer_id: String,
    /// Canonical fingerprint; empty until assigned by the registry
    #[serde(default)]
    pub finding_id: String,
    /// Analyzer-specific category
    pub category: String,
    /// Severity
    pub severity: Severity,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Review status
    #[serde(default)]
    pub status: FindingStatus,
    /// Where
    pub location: Location,
    /// Supporting facts
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Suggested classification
    pub suggested_classification: Classification,
    /// Suggested action
    pub recommended_action: RecommendedAction,
    /// Invariant ids this finding relates to
    #[serde(default)]
    pub related_invariants: Vec<String>,
    /// Other paths involved
    #[serde(default)]
    pub related_paths: Vec<String>,
}

impl Finding {
    /// New OPEN finding at `file`
    pub fn new(
        analyzer_id: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        confidence: f64,
        file: impl Into<String>,
    ) -> Self {
        Self {
            analyzer_id: analyzer_id.into(),
            finding_id: String::new(),
            category: category.into(),
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            status: FindingStatus::Open,
            location: Location {
                file: file.into(),
                line: 0,
                end_line: 0,
            },
            evidence: Vec::new(),
            suggested_classification: Classification::Canonical,
            recommended_action: RecommendedAction::Keep,
            related_invariants: Vec::new(),
            related_paths: Vec::new(),
        }
    }

    /// Set a single-line location
    #[must_use]
    pub fn at_line(mut self, line: u32) -> Self {
        self.location.line = line;
        self.location.end_line = line;
        self
    }

    /// Set a line span
    #[must_use]
    pub fn at_lines(mut self, line: u32, end_line: u32) -> Self {
        self.location.line = line;
        self.location.end_line = end_line.max(line);
        self
    }

    /// Classification and action
    #[must_use]
    pub fn suggest(mut self, class: Classification, action: RecommendedAction) -> Self {
        self.suggested_classification = class;
        self.recommended_action = action;
        self
    }

    /// Append evidence
    #[must_use]
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Add a related invariant id
    #[must_use]
    pub fn with_invariant(mut self, invariant: impl Into<String>) -> Self {
        self.related_invariants.push(invariant.into());
        self
    }

    /// Add a related path
    #[must_use]
    pub fn with_related_path(mut self, path: impl Into<String>) -> Self {
        self.related_paths.push(path.into());
        self
    }

    /// Canonical fingerprint (id and review status excluded)
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("finding_id");
            map.remove("fingerprint");
            map.remove("status");
        }
        canonical_sha256(&value).to_hex()
    }

    /// Assign `finding_id` from [`Self::fingerprint`]
    pub fn assign_id(&mut self) {
        self.finding_id = self.fingerprint();
    }

    /// Registry sort key
    #[must_use]
    pub fn sort_key(&self) -> (&str, &str, Severity, &str, &str) {
        (
            &self.analyzer_id,
            &self.category,
            self.severity,
            &self.location.file,
            &self.finding_id,
        )
    }
}
