//! xstack audit analyzers
//!
//! Pure analyzers over the shared [`xstack_graph::RepoGraph`], a registry
//! that runs them in a fixed order, and the canonical findings report.
//!
//! # Core Concepts
//!
//! - [`Analyzer`]: `id`, `watch_prefixes`, `run(&AnalyzerContext)`
//! - [`AnalyzerRegistry`]: incremental selection, fingerprinting, dedup, sort
//! - [`default_registry`]: the eleven built-in analyzer families
//! - [`FindingsReport`] / [`diff_findings`]: persisted report and trend diff
//!
//! Findings are ordered by `(analyzer_id, category, severity, file,
//! finding_id)` so output never depends on how analyzers were scheduled.

mod analyzer;
mod analyzers;
mod error;
mod finding;
mod report;

pub use analyzer::{sort_findings, under_prefix, Analyzer, AnalyzerContext, AnalyzerRegistry};
pub use analyzers::{
    default_registry, AnalyzerConfig, BlockerRecurrenceAnalyzer, CanonDriftAnalyzer,
    CapabilityDriftAnalyzer, DerivedContractAnalyzer, OpaqueContext, OwnershipBoundaryAnalyzer,
    PromptDriftAnalyzer, ReachabilityAnalyzer, RunMetaInputAnalyzer, SchemaUsageAnalyzer,
    SemanticSmellAnalyzer, WorkspaceContaminationAnalyzer,
};
pub use error::{AuditError, AuditResult};
pub use finding::{Classification, Finding, FindingStatus, Location, RecommendedAction, Severity};
pub use report::{diff_findings, FindingsDiff, FindingsReport, FINDINGS_SCHEMA_ID, FINDINGS_SCHEMA_VERSION};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
