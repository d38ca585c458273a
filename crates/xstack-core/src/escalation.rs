//! Escalation router
//!
//! Splits failing groups into mechanical failures (handed to remediation)
//! and semantic ones (handed to a human as a seven-line blocker).

use crate::result::FailureClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use xstack_kernel::{split_refusal, GroupOutcome};

/// `refuse.` families a repair can address
pub const MECHANICAL_FAMILIES: [&str; 7] = [
    "tool_missing",
    "path_unresolved",
    "canonical_hash",
    "schema_load",
    "timeout",
    "gate_violation",
    "workspace_escape",
];

/// `refuse.` families that always need a decision
pub const SEMANTIC_FAMILIES: [&str; 2] = ["ambiguous_policy", "invariant_conflict"];

const DRIFT_FAMILY: &str = "canonical_drift";
const DRIFT_CODE: &str = "REFUSE_CANONICAL_DRIFT";
const MECHANICAL_CODES: [&str; 4] = [
    "REFUSE_INVALID_INPUT",
    "REFUSE_TOOL_MISSING",
    "REFUSE_WORKSPACE_ESCAPE",
    "REFUSE_OVERRIDE_FORBIDDEN",
];

/// Why a failure needs a human
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "evidence", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticCause {
    /// `refuse.ambiguous_policy.*`
    AmbiguousPolicy(String),
    /// `refuse.invariant_conflict.*`
    InvariantConflict(String),
    /// A refusal family nothing knows how to repair
    UnknownRefusal(String),
    /// An escalation keyword in the output
    Keyword(String),
}

impl SemanticCause {
    /// `BLOCKER TYPE` line value
    #[must_use]
    pub fn blocker_type(&self) -> &'static str {
        match self {
            Self::AmbiguousPolicy(_) => "AMBIGUOUS_POLICY",
            Self::InvariantConflict(_) => "INVARIANT_CONFLICT",
            Self::UnknownRefusal(_) => "UNKNOWN_REFUSAL",
            Self::Keyword(_) => "ESCALATION_KEYWORD",
        }
    }

    /// Token or line that triggered the escalation
    #[must_use]
    pub fn evidence(&self) -> &str {
        match self {
            Self::AmbiguousPolicy(e)
            | Self::InvariantConflict(e)
            | Self::UnknownRefusal(e)
            | Self::Keyword(e) => e,
        }
    }

    /// One-sentence `ROOT CAUSE` line value
    #[must_use]
    pub fn root_cause(&self) -> String {
        match self {
            Self::AmbiguousPolicy(e) => format!("Policy text is ambiguous for this gate ({e})."),
            Self::InvariantConflict(e) => format!("Two invariants cannot both hold ({e})."),
            Self::UnknownRefusal(e) => format!("No repair strategy owns the refusal {e}."),
            Self::Keyword(e) => format!("The gate asked for a human decision ({e})."),
        }
    }

    fn options(&self) -> (&'static [SemanticOption], &'static str) {
        use SemanticOption::{
            AddOverride, AmendInvariant, ClarifyPolicy, FixEmittingGate, RegisterRefusalFamily,
            RetireInvariant,
        };
        match self {
            Self::AmbiguousPolicy(_) => (
                &[ClarifyPolicy, AddOverride, AmendInvariant],
                "Policy wording decides what the gate enforces; an override only defers the question.",
            ),
            Self::InvariantConflict(_) => (
                &[AmendInvariant, RetireInvariant, AddOverride],
                "Two invariants cannot both hold; the invariant set itself has to change.",
            ),
            Self::UnknownRefusal(_) => (
                &[RegisterRefusalFamily, FixEmittingGate, AddOverride],
                "No repair strategy owns this refusal family, so its meaning must be decided first.",
            ),
            Self::Keyword(_) => (
                &[ClarifyPolicy, AmendInvariant, AddOverride],
                "The gate asked for a decision explicitly.",
            ),
        }
    }
}

/// Decision a human can take on a blocker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticOption {
    /// Rewrite the policy text
    ClarifyPolicy,
    /// Change the invariant
    AmendInvariant,
    /// Drop one of the conflicting invariants
    RetireInvariant,
    /// Waive with a time-bound override
    AddOverride,
    /// Teach the router the refusal family
    RegisterRefusalFamily,
    /// Fix the gate that emitted the refusal
    FixEmittingGate,
}

impl SemanticOption {
    /// Wire token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClarifyPolicy => "CLARIFY_POLICY",
            Self::AmendInvariant => "AMEND_INVARIANT",
            Self::RetireInvariant => "RETIRE_INVARIANT",
            Self::AddOverride => "ADD_OVERRIDE",
            Self::RegisterRefusalFamily => "REGISTER_REFUSAL_FAMILY",
            Self::FixEmittingGate => "FIX_EMITTING_GATE",
        }
    }
}

impl fmt::Display for SemanticOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one failing group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Class
    pub class: FailureClass,
    /// Set for [`FailureClass::Semantic`]
    pub cause: Option<SemanticCause>,
}

impl Classification {
    fn mechanical() -> Self {
        Self {
            class: FailureClass::Mechanical,
            cause: None,
        }
    }
}

/// Classify a failing outcome
///
/// Canonical drift wins over everything; semantic refusal families, unknown
/// families and configured keywords come next; the rest is mechanical.
#[must_use]
pub fn classify(outcome: &GroupOutcome, keywords: &[String]) -> Classification {
    let tokens = &outcome.refusal_tokens;
    let drift = tokens.iter().any(|t| {
        t == DRIFT_CODE || split_refusal(t).is_some_and(|(family, _)| family == DRIFT_FAMILY)
    });
    if drift {
        return Classification {
            class: FailureClass::CanonicalDrift,
            cause: None,
        };
    }
    if outcome.is_mechanical_refusal() {
        return Classification::mechanical();
    }

    for token in tokens {
        let cause = if let Some((family, _)) = split_refusal(token) {
            match family {
                "ambiguous_policy" => Some(SemanticCause::AmbiguousPolicy(token.clone())),
                "invariant_conflict" => Some(SemanticCause::InvariantConflict(token.clone())),
                f if MECHANICAL_FAMILIES.contains(&f) => None,
                _ => Some(SemanticCause::UnknownRefusal(token.clone())),
            }
        } else if token.starts_with("REFUSE_") && !MECHANICAL_CODES.contains(&token.as_str()) {
            Some(SemanticCause::UnknownRefusal(token.clone()))
        } else {
            None
        };
        if let Some(cause) = cause {
            return Classification {
                class: FailureClass::Semantic,
                cause: Some(cause),
            };
        }
    }

    let lowered: Vec<String> = keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .map(|k| k.to_lowercase())
        .collect();
    for line in &outcome.violations {
        let line_lower = line.to_lowercase();
        if lowered.iter().any(|k| line_lower.contains(k.as_str())) {
            return Classification {
                class: FailureClass::Semantic,
                cause: Some(SemanticCause::Keyword(line.trim().to_owned())),
            };
        }
    }
    Classification::mechanical()
}

/// Structured blocker for a semantic escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    /// `BLOCKER TYPE`
    pub blocker_type: String,
    /// `FAILED GATE`
    pub failed_gate: String,
    /// `ROOT CAUSE`, one sentence
    pub root_cause: String,
    /// `ATTEMPTED FIXES`
    pub attempted_fixes: Vec<String>,
    /// `REMAINING SEMANTIC OPTIONS`, as [`SemanticOption`] tokens
    pub remaining_options: Vec<String>,
    /// `RECOMMENDED OPTION`, a [`SemanticOption`] token
    pub recommended_option: String,
    /// `RATIONALE`
    pub rationale: String,
}

impl Blocker {
    /// Blocker for `gate` escalated because of `cause`
    #[must_use]
    pub fn new(gate: &str, cause: &SemanticCause, attempted_fixes: Vec<String>) -> Self {
        let (options, rationale) = cause.options();
        Self {
            blocker_type: cause.blocker_type().to_owned(),
            failed_gate: gate.to_owned(),
            root_cause: cause.root_cause(),
            attempted_fixes,
            remaining_options: options.iter().map(|o| o.as_str().to_owned()).collect(),
            recommended_option: options.first().map(|o| o.as_str().to_owned()).unwrap_or_default(),
            rationale: rationale.to_owned(),
        }
    }

    /// The seven lines, newline-terminated
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fixes = if self.attempted_fixes.is_empty() {
            "none".to_owned()
        } else {
            self.attempted_fixes.join("; ")
        };
        writeln!(f, "BLOCKER TYPE: {}", self.blocker_type)?;
        writeln!(f, "FAILED GATE: {}", self.failed_gate)?;
        writeln!(f, "ROOT CAUSE: {}", self.root_cause)?;
        writeln!(f, "ATTEMPTED FIXES: {fixes}")?;
        writeln!(f, "REMAINING SEMANTIC OPTIONS: {}", self.remaining_options.join("; "))?;
        writeln!(f, "RECOMMENDED OPTION: {}", self.recommended_option)?;
        writeln!(f, "RATIONALE: {}", self.rationale)
    }
}

/// Routing decision for one failing group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    /// Group id
    pub group_id: String,
    /// Classification
    pub classification: Classification,
    /// Present only for semantic failures
    pub blocker: Option<Blocker>,
}

/// Classify `outcome` and build a blocker when it is semantic
#[must_use]
pub fn route(outcome: &GroupOutcome, keywords: &[String], attempted_fixes: &[String]) -> Escalation {
    let classification = classify(outcome, keywords);
    let blocker = classification
        .cause
        .as_ref()
        .map(|cause| Blocker::new(&outcome.group_id, cause, attempted_fixes.to_vec()));
    if let Some(blocker) = &blocker {
        tracing::warn!(
            group = %outcome.group_id,
            blocker_type = %blocker.blocker_type,
            "semantic escalation"
        );
    }
    Escalation {
        group_id: outcome.group_id.clone(),
        classification,
        blocker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xstack_kernel::Profile;

    fn failing(lines: &[&str]) -> GroupOutcome {
        let violations: Vec<String> = lines.iter().map(|l| (*l).to_owned()).collect();
        let refusal_tokens = xstack_kernel::refusal_tokens_in(violations.iter().map(String::as_str))
            .into_iter()
            .collect();
        GroupOutcome {
            group_id: "auditx.policy".into(),
            profile: Profile::Strict,
            dep_hash: "h".into(),
            returncode: 1,
            violations,
            refusal_tokens,
            cache_hit: false,
            spawned: true,
            timed_out: false,
            cancelled: false,
            seconds: 0.0,
        }
    }

    #[test]
    fn mechanical_failures_never_block() {
        for lines in [
            &["refuse.tool_missing.cc"][..],
            &["INV-A broken", "plain error"][..],
            &["refuse.schema_load.a", "refuse.timeout.g"][..],
        ] {
            let escalation = route(&failing(lines), &[], &[]);
            assert_eq!(escalation.classification.class, FailureClass::Mechanical);
            assert!(escalation.blocker.is_none());
        }
    }

    #[test]
    fn semantic_families_and_unknown_families() {
        let c = classify(&failing(&["refuse.ambiguous_policy.naming"]), &[]);
        assert_eq!(c.class, FailureClass::Semantic);
        assert_eq!(c.cause.unwrap().blocker_type(), "AMBIGUOUS_POLICY");

        let c = classify(&failing(&["refuse.weather.rain"]), &[]);
        assert_eq!(c.cause, Some(SemanticCause::UnknownRefusal("refuse.weather.rain".into())));

        let c = classify(&failing(&["REFUSE_MYSTERY"]), &[]);
        assert_eq!(c.class, FailureClass::Semantic);
    }

    #[test]
    fn drift_beats_semantic() {
        let c = classify(
            &failing(&["refuse.ambiguous_policy.x", "REFUSE_CANONICAL_DRIFT"]),
            &[],
        );
        assert_eq!(c.class, FailureClass::CanonicalDrift);
    }

    #[test]
    fn keywords_escalate() {
        let keywords = vec!["Needs Human Decision".to_owned()];
        let c = classify(&failing(&["INV-X: needs human decision on naming"]), &keywords);
        assert_eq!(c.class, FailureClass::Semantic);
        assert_eq!(
            c.cause,
            Some(SemanticCause::Keyword("INV-X: needs human decision on naming".into()))
        );
    }

    #[test]
    fn blocker_has_exactly_seven_lines() {
        let escalation = route(
            &failing(&["refuse.invariant_conflict.INV-A.INV-B"]),
            &[],
            &["CACHE_INVALIDATE".into(), "CANONICAL_REWRITE".into()],
        );
        let text = escalation.blocker.unwrap().render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "BLOCKER TYPE: INVARIANT_CONFLICT");
        assert_eq!(lines[1], "FAILED GATE: auditx.policy");
        assert_eq!(
            lines[2],
            "ROOT CAUSE: Two invariants cannot both hold (refuse.invariant_conflict.INV-A.INV-B)."
        );
        assert_eq!(lines[3], "ATTEMPTED FIXES: CACHE_INVALIDATE; CANONICAL_REWRITE");
        assert_eq!(
            lines[4],
            "REMAINING SEMANTIC OPTIONS: AMEND_INVARIANT; RETIRE_INVARIANT; ADD_OVERRIDE"
        );
        assert_eq!(lines[5], "RECOMMENDED OPTION: AMEND_INVARIANT");
        assert!(lines[6].starts_with("RATIONALE: "));
    }

    #[test]
    fn recommended_option_is_a_known_token() {
        let causes = [
            SemanticCause::AmbiguousPolicy("refuse.ambiguous_policy.naming".into()),
            SemanticCause::InvariantConflict("refuse.invariant_conflict.a".into()),
            SemanticCause::UnknownRefusal("REFUSE_MYSTERY".into()),
            SemanticCause::Keyword("needs human decision".into()),
        ];
        for cause in &causes {
            let blocker = Blocker::new("g", cause, Vec::new());
            let token: SemanticOption =
                serde_json::from_value(serde_json::Value::String(blocker.recommended_option.clone()))
                    .unwrap();
            assert_eq!(token.as_str(), blocker.recommended_option);
            assert_eq!(blocker.remaining_options[0], blocker.recommended_option);

            let cause_line = blocker.root_cause.trim_end_matches('.');
            assert!(blocker.root_cause.ends_with('.'));
            assert!(!cause_line.contains(". ") && !blocker.root_cause.contains('\n'));
            assert!(blocker.root_cause.contains(cause.evidence()));
        }
    }

    #[test]
    fn no_fixes_renders_none() {
        let blocker = Blocker::new("g", &SemanticCause::Keyword("x".into()), Vec::new());
        assert!(blocker.render().contains("ATTEMPTED FIXES: none\n"));
    }
}
