//! Built-in analyzer families
//!
//! Each family lives in its own module. [`default_registry`] wires them in
//! a fixed order from an [`AnalyzerConfig`].

use crate::analyzer::AnalyzerRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod blocker_recurrence;
mod canon_drift;
mod capability;
mod derived_contract;
mod ownership;
mod prompt_drift;
mod reachability;
mod run_meta_input;
mod schema_usage;
mod smells;
mod workspace_contamination;

pub use blocker_recurrence::BlockerRecurrenceAnalyzer;
pub use canon_drift::CanonDriftAnalyzer;
pub use capability::CapabilityDriftAnalyzer;
pub use derived_contract::DerivedContractAnalyzer;
pub use ownership::OwnershipBoundaryAnalyzer;
pub use prompt_drift::PromptDriftAnalyzer;
pub use reachability::ReachabilityAnalyzer;
pub use run_meta_input::RunMetaInputAnalyzer;
pub use schema_usage::SchemaUsageAnalyzer;
pub use smells::SemanticSmellAnalyzer;
pub use workspace_contamination::WorkspaceContaminationAnalyzer;

/// Opaque identifiers passed through to analyzers
///
/// The core never interprets these; analyzers may quote them as evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpaqueContext {
    /// Session spec identifier
    pub session_spec: Option<String>,
    /// Authority context identifier
    pub authority_context: Option<String>,
    /// Law profile identifier
    pub law_profile: Option<String>,
}

/// Analyzer configuration, usually the `[audit]` table of `.xstack.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Top-level directories that must not depend on legacy code
    pub canonical_roots: Vec<String>,
    /// Prefixes holding governance and prompt documents
    pub governance_prefixes: Vec<String>,
    /// Phrases that instruct readers to bypass gates
    pub bypass_tokens: Vec<String>,
    /// Prefixes holding developer scripts
    pub dev_script_prefixes: Vec<String>,
    /// Command registry (`{commands:[{command_id, capabilities}]}`)
    pub command_registry: String,
    /// Capability matrix (`{capabilities:[...]}`)
    pub capability_matrix: String,
    /// Gate group registry
    pub group_registry: String,
    /// Root of per-workspace remediation runlogs
    pub remediation_root: String,
    /// Number of runs a refusal token must recur in to be reported
    pub recurrence_threshold: usize,
    /// Deprecated term → preferred term
    pub deprecated_terms: BTreeMap<String, String>,
    /// Opaque identifiers
    pub opaque: OpaqueContext,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
        Self {
            canonical_roots: strings(&[
                "client", "data", "engine", "game", "packs", "schema", "scripts", "server", "src",
                "tools",
            ]),
            governance_prefixes: strings(&[
                "AGENTS.md",
                "CONTRIBUTING.md",
                "docs/architecture",
                "docs/governance",
                "docs/prompts",
            ]),
            bypass_tokens: strings(&[
                "--no-verify",
                "bypass the gate",
                "disable the gate",
                "ignore invariants",
                "override all invariants",
                "skip the gate",
                "skip gates",
            ]),
            dev_script_prefixes: strings(&["scripts", "tools"]),
            command_registry: "data/registries/command_registry.json".to_owned(),
            capability_matrix: "data/registries/capability_matrix.json".to_owned(),
            group_registry: "data/registries/gate_groups.json".to_owned(),
            remediation_root: "docs/audit/remediation".to_owned(),
            recurrence_threshold: 3,
            deprecated_terms: [("blacklist", "denylist"), ("whitelist", "allowlist")]
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            opaque: OpaqueContext::default(),
        }
    }
}

/// All built-in analyzers in their fixed registration order
#[must_use]
pub fn default_registry(config: &AnalyzerConfig) -> AnalyzerRegistry {
    AnalyzerRegistry::new()
        .with(ReachabilityAnalyzer)
        .with(OwnershipBoundaryAnalyzer::new(config.canonical_roots.clone()))
        .with(CanonDriftAnalyzer)
        .with(SchemaUsageAnalyzer)
        .with(CapabilityDriftAnalyzer::new(
            config.command_registry.clone(),
            config.capability_matrix.clone(),
        ))
        .with(DerivedContractAnalyzer)
        .with(PromptDriftAnalyzer::new(
            config.governance_prefixes.clone(),
            config.bypass_tokens.clone(),
        ))
        .with(WorkspaceContaminationAnalyzer::new(config.dev_script_prefixes.clone()))
        .with(BlockerRecurrenceAnalyzer::new(
            config.remediation_root.clone(),
            config.recurrence_threshold,
        ))
        .with(SemanticSmellAnalyzer::new(
            config.deprecated_terms.clone(),
            config.opaque.authority_context.clone(),
        ))
        .with(RunMetaInputAnalyzer::new(config.group_registry.clone()))
}
