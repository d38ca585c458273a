//! Per-run remediation log
//!
//! One DERIVED_VIEW document per `(workspace, plan)` under
//! `docs/audit/remediation/<ws>/run-<plan_hash12>/RUNLOG.json`. Everything
//! that depends on the clock lives under `extensions.timing`; the record
//! itself is identical for two runs that made the same decisions.

use crate::error::GateError;
use crate::escalation::Blocker;
use crate::refusal::Refusal;
use crate::remediation::RemediationRecord;
use crate::result::{FailureClass, GateResult};
use crate::writer::ArtifactWriter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use xstack_canon::CanonicalArtifact;
use xstack_kernel::{GroupOutcome, Profile};

/// Remediation log root, repo-relative
pub const REMEDIATION_ROOT: &str = "docs/audit/remediation";

/// File name inside a run directory
pub const RUNLOG_FILE: &str = "RUNLOG.json";

/// Schema id of the runlog
pub const RUNLOG_SCHEMA_ID: &str = "xstack.remediation.runlog";

/// Schema version of the runlog
pub const RUNLOG_SCHEMA_VERSION: &str = "1.0.0";

const PLAN_HASH_PREFIX: usize = 12;

/// What happened to one failing or passing group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Passed on the first run
    Passed,
    /// Failed, then passed after remediation
    Remediated,
    /// Failed on invariants covered by active overrides
    Waived,
    /// Failed
    Failed,
    /// Interrupted by cancellation or the plan deadline
    Cancelled,
}

/// One runlog step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunlogStep {
    /// Group id
    pub group_id: String,
    /// Final status
    pub status: StepStatus,
    /// Final return code
    pub returncode: i32,
    /// First run served from the cache
    pub cache_hit: bool,
    /// Class of a failed step
    pub failure_class: Option<FailureClass>,
    /// Refusal tokens still present at the end
    pub refusal_tokens: Vec<String>,
    /// Repair attempts, when any ran
    pub remediation: Option<RemediationRecord>,
    /// Rendered blocker for a semantic escalation
    pub blocker: Option<String>,
    #[serde(skip)]
    seconds: f64,
}

impl RunlogStep {
    /// Step for a group that needed nothing further
    #[must_use]
    pub fn from_outcome(outcome: &GroupOutcome, status: StepStatus) -> Self {
        Self {
            group_id: outcome.group_id.clone(),
            status,
            returncode: outcome.returncode,
            cache_hit: outcome.cache_hit,
            failure_class: None,
            refusal_tokens: outcome.refusal_tokens.clone(),
            remediation: None,
            blocker: None,
            seconds: outcome.seconds,
        }
    }

    /// Record the class of a failed step
    #[must_use]
    pub fn with_failure_class(mut self, class: FailureClass) -> Self {
        self.failure_class = Some(class);
        self
    }

    /// Attach the remediation history; return code and tokens follow its final outcome
    #[must_use]
    pub fn with_remediation(mut self, record: RemediationRecord) -> Self {
        self.returncode = record.final_outcome.returncode;
        self.refusal_tokens = record.final_outcome.refusal_tokens.clone();
        self.seconds += record.final_outcome.seconds;
        self.remediation = Some(record);
        self
    }

    /// Attach a blocker
    #[must_use]
    pub fn with_blocker(mut self, blocker: &Blocker) -> Self {
        self.blocker = Some(blocker.render());
        self
    }

    /// Wall time spent on this group
    #[must_use]
    pub fn seconds(&self) -> f64 {
        self.seconds
    }
}

/// Findings counters recorded in the runlog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsSummary {
    /// Findings in the current report
    pub total: usize,
    /// New since the previous report
    pub added: usize,
    /// Gone since the previous report
    pub resolved: usize,
}

/// The whole runlog
#[derive(Debug, Clone, PartialEq)]
pub struct Runlog {
    /// Workspace id
    pub workspace_id: String,
    /// `precheck`, `verify`, `exitcheck` or `run`
    pub entry: String,
    /// Profile
    pub profile: Profile,
    /// Plan hash, empty when no plan was composed
    pub plan_hash: String,
    /// Plan payload (`{profile, nodes}`)
    pub plan: Value,
    /// Steps in plan order
    pub steps: Vec<RunlogStep>,
    /// Final result; `total_seconds` is kept out of the record
    pub result: GateResult,
    /// Cancelled or hit the plan deadline
    pub cancelled: bool,
    /// Paths written outside the allow-list
    pub escaped_paths: Vec<String>,
    /// Refusals raised by the driver itself
    pub refusals: Vec<Refusal>,
    /// Unresolved refusal tokens across all steps, sorted
    pub refusal_tokens: Vec<String>,
    /// Semantic blockers
    pub blockers: Vec<Blocker>,
    /// Findings counters, when analyzers ran
    pub findings: Option<FindingsSummary>,
    /// Identity fingerprint, when the manifest was written
    pub identity_fingerprint: Option<String>,
    /// Named phase timings in seconds
    pub timing: Vec<(String, f64)>,
}

impl Runlog {
    /// Empty runlog for `entry` in workspace `workspace_id`
    #[must_use]
    pub fn new(workspace_id: impl Into<String>, entry: impl Into<String>, profile: Profile) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            entry: entry.into(),
            profile,
            plan_hash: String::new(),
            plan: Value::Null,
            steps: Vec::new(),
            result: GateResult::new(&Default::default(), false),
            cancelled: false,
            escaped_paths: Vec::new(),
            refusals: Vec::new(),
            refusal_tokens: Vec::new(),
            blockers: Vec::new(),
            findings: None,
            identity_fingerprint: None,
            timing: Vec::new(),
        }
    }

    /// Record a phase duration
    pub fn time(&mut self, phase: impl Into<String>, seconds: f64) {
        self.timing.push((phase.into(), seconds));
    }

    /// Repo-relative run directory
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        run_dir(&self.workspace_id, &self.plan_hash)
    }

    /// DERIVED_VIEW envelope; timings go to `extensions.timing`
    #[must_use]
    pub fn to_artifact(&self) -> CanonicalArtifact {
        let steps: Vec<Value> = self
            .steps
            .iter()
            .map(|s| {
                let mut step = serde_json::to_value(s).unwrap_or(Value::Null);
                if let Some(outcome) = step
                    .pointer_mut("/remediation/final_outcome")
                    .and_then(Value::as_object_mut)
                {
                    outcome.remove("seconds");
                }
                step
            })
            .collect();
        let record = json!({
            "workspace_id": self.workspace_id,
            "entry": self.entry,
            "profile": self.profile,
            "plan_hash": self.plan_hash,
            "plan": self.plan,
            "steps": steps,
            "returncode": self.result.returncode,
            "failure_classes": self.result.failure_classes,
            "primary_failure_class": self.result.primary_failure_class,
            "cache_hits": self.result.cache_hits,
            "cache_misses": self.result.cache_misses,
            "cancelled": self.cancelled,
            "escaped_paths": self.escaped_paths,
            "refusals": self.refusals,
            "refusal_tokens": self.refusal_tokens,
            "blockers": self.blockers,
            "findings": self.findings,
            "identity_fingerprint": self.identity_fingerprint,
        });

        let mut groups = Map::new();
        for step in &self.steps {
            groups.insert(step.group_id.clone(), json!(step.seconds));
        }
        let mut phases = Map::new();
        for (phase, seconds) in &self.timing {
            phases.insert(phase.clone(), json!(seconds));
        }
        CanonicalArtifact::derived_view(RUNLOG_SCHEMA_ID, RUNLOG_SCHEMA_VERSION, record).with_extensions(json!({
            "timing": {
                "total_seconds": self.result.total_seconds,
                "groups": groups,
                "phases": phases,
            }
        }))
    }

    /// Write under `docs/audit/remediation/`
    ///
    /// # Errors
    /// Allow-list or IO failures
    pub fn write(&self, writer: &ArtifactWriter) -> Result<PathBuf, GateError> {
        writer.write_derived_view(&self.run_dir().join(RUNLOG_FILE), &self.to_artifact())
    }
}

/// `docs/audit/remediation/<ws>/run-<plan_hash12>`
#[must_use]
pub fn run_dir(workspace_id: &str, plan_hash: &str) -> PathBuf {
    let prefix: String = plan_hash.chars().take(PLAN_HASH_PREFIX).collect();
    let name = if prefix.is_empty() {
        "run-noplan".to_owned()
    } else {
        format!("run-{prefix}")
    };
    Path::new(REMEDIATION_ROOT).join(workspace_id).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn outcome(id: &str, rc: i32, seconds: f64) -> GroupOutcome {
        GroupOutcome {
            group_id: id.into(),
            profile: Profile::Fast,
            dep_hash: "h".into(),
            returncode: rc,
            violations: Vec::new(),
            refusal_tokens: Vec::new(),
            cache_hit: false,
            spawned: true,
            timed_out: false,
            cancelled: false,
            seconds,
        }
    }

    fn runlog(seconds: f64) -> Runlog {
        let mut log = Runlog::new("ws-1", "precheck", Profile::Fast);
        log.plan_hash = "0123456789abcdef".into();
        log.steps.push(RunlogStep::from_outcome(&outcome("repox.a", 0, seconds), StepStatus::Passed));
        log.steps.push(
            RunlogStep::from_outcome(&outcome("repox.b", 1, seconds), StepStatus::Failed)
                .with_failure_class(FailureClass::Mechanical),
        );
        let classes: BTreeSet<FailureClass> = [FailureClass::Mechanical].into_iter().collect();
        log.result = GateResult::new(&classes, false);
        log.result.total_seconds = seconds * 2.0;
        log.time("execute", seconds);
        log
    }

    #[test]
    fn run_dir_uses_the_hash_prefix() {
        assert_eq!(
            run_dir("ws-1", "0123456789abcdef"),
            Path::new("docs/audit/remediation/ws-1/run-0123456789ab")
        );
        assert_eq!(
            run_dir("ws-1", ""),
            Path::new("docs/audit/remediation/ws-1/run-noplan")
        );
    }

    #[test]
    fn record_is_independent_of_timing() {
        let fast = runlog(0.5).to_artifact();
        let slow = runlog(7.25).to_artifact();
        assert_eq!(fast.record, slow.record);
        assert_ne!(fast.extensions, slow.extensions);
        assert_eq!(slow.extensions["timing"]["groups"]["repox.b"], json!(7.25));
        assert_eq!(fast.record["steps"][1]["failure_class"], "MECHANICAL");
        assert_eq!(fast.record["returncode"], 1);
        assert_eq!(fast.artifact_class.as_str(), "DERIVED_VIEW");
    }
}
