//! Repair families and strategy classes

use serde::{Deserialize, Serialize};
use std::fmt;
use xstack_kernel::{split_refusal, GroupOutcome};

/// Kind of mechanical failure a repair targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairFamily {
    /// `refuse.tool_missing.*`
    ToolMissing,
    /// `refuse.path_unresolved.*`
    PathUnresolved,
    /// `refuse.canonical_hash.*`
    CanonicalHash,
    /// `refuse.schema_load.*`
    SchemaLoad,
    /// `refuse.timeout.*`
    Timeout,
    /// Anything else a gate reports
    GateViolation,
}

impl RepairFamily {
    /// Every family, in match priority order
    pub const ALL: [Self; 6] = [
        Self::ToolMissing,
        Self::PathUnresolved,
        Self::CanonicalHash,
        Self::SchemaLoad,
        Self::Timeout,
        Self::GateViolation,
    ];

    /// Wire form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolMissing => "TOOL_MISSING",
            Self::PathUnresolved => "PATH_UNRESOLVED",
            Self::CanonicalHash => "CANONICAL_HASH",
            Self::SchemaLoad => "SCHEMA_LOAD",
            Self::Timeout => "TIMEOUT",
            Self::GateViolation => "GATE_VIOLATION",
        }
    }

    /// Parse the wire form or the lowercase `refuse.` family
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let upper = token.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|f| f.as_str() == upper)
    }

    /// Family of a single refusal token, if it names one
    #[must_use]
    pub fn of_token(token: &str) -> Option<Self> {
        if token == "REFUSE_TOOL_MISSING" {
            return Some(Self::ToolMissing);
        }
        let (family, _) = split_refusal(token)?;
        Self::parse(family).filter(|f| *f != Self::GateViolation)
    }

    /// Family of a failing outcome
    ///
    /// The first family in [`Self::ALL`] order named by any token wins;
    /// invariant ids and unknown tokens fall back to `GATE_VIOLATION`.
    #[must_use]
    pub fn of_outcome(outcome: &GroupOutcome) -> Self {
        outcome
            .refusal_tokens
            .iter()
            .filter_map(|t| Self::of_token(t))
            .min()
            .unwrap_or(Self::GateViolation)
    }
}

impl fmt::Display for RepairFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy class; attempts on one group never repeat a class
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyClass {
    /// Re-provision workspace tools from the tool source
    ToolDiscovery,
    /// Bind a matching script from `tools/` or `scripts/` into the tools dir
    ToolUiBind,
    /// Recreate the workspace directories and tools
    WorkspaceRebuild,
    /// Drop cached group results
    CacheInvalidate,
    /// Re-serialize canonical artifacts under `docs/audit`
    CanonicalRewrite,
    /// Create unresolved directories inside the allow-list
    PathRenormalize,
    /// Configured external command
    Command(String),
}

impl StrategyClass {
    /// Wire form
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ToolDiscovery => "TOOL_DISCOVERY",
            Self::ToolUiBind => "TOOL_UI_BIND",
            Self::WorkspaceRebuild => "WORKSPACE_REBUILD",
            Self::CacheInvalidate => "CACHE_INVALIDATE",
            Self::CanonicalRewrite => "CANONICAL_REWRITE",
            Self::PathRenormalize => "PATH_RENORMALIZE",
            Self::Command(name) => name,
        }
    }
}

impl fmt::Display for StrategyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xstack_kernel::Profile;

    fn outcome(tokens: &[&str]) -> GroupOutcome {
        GroupOutcome {
            group_id: "g".into(),
            profile: Profile::Fast,
            dep_hash: "h".into(),
            returncode: 1,
            violations: Vec::new(),
            refusal_tokens: tokens.iter().map(|t| (*t).to_owned()).collect(),
            cache_hit: false,
            spawned: true,
            timed_out: false,
            cancelled: false,
            seconds: 0.0,
        }
    }

    #[test]
    fn token_families() {
        assert_eq!(RepairFamily::of_token("refuse.tool_missing.cc"), Some(RepairFamily::ToolMissing));
        assert_eq!(RepairFamily::of_token("refuse.timeout.testx.unit"), Some(RepairFamily::Timeout));
        assert_eq!(RepairFamily::of_token("REFUSE_TOOL_MISSING"), Some(RepairFamily::ToolMissing));
        assert_eq!(RepairFamily::of_token("INV-A"), None);
        assert_eq!(RepairFamily::of_token("refuse.gate_violation.x"), None);
    }

    #[test]
    fn outcome_family_priority() {
        let mixed = outcome(&["refuse.timeout.g", "refuse.tool_missing.cc"]);
        assert_eq!(RepairFamily::of_outcome(&mixed), RepairFamily::ToolMissing);
        assert_eq!(RepairFamily::of_outcome(&outcome(&["INV-A"])), RepairFamily::GateViolation);
        assert_eq!(RepairFamily::of_outcome(&outcome(&[])), RepairFamily::GateViolation);
    }

    #[test]
    fn wire_names() {
        assert_eq!(RepairFamily::parse("schema_load"), Some(RepairFamily::SchemaLoad));
        assert_eq!(StrategyClass::ToolUiBind.to_string(), "TOOL_UI_BIND");
        assert_eq!(StrategyClass::Command("REGEN".into()).name(), "REGEN");
    }
}
