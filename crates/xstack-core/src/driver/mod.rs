//! Gate driver
//!
//! `precheck`, `verify` and `exitcheck` share one pipeline. The driver
//! derives the workspace, restores the graph, composes and executes the
//! plan, then turns every failing group into a waiver, a repair, an
//! escalation or a failure class. The exit code follows from the classes
//! and the refusals raised along the way.

mod context;

pub use context::{load_graph, GateContext};

use crate::blocking;
use crate::config::{changed_files, is_truthy, GateConfig};
use crate::error::GateError;
use crate::escalation::{route, Blocker};
use crate::identity::{IdentityManifest, IDENTITY_MANIFEST_FILE};
use crate::overrides::OverrideLedger;
use crate::refusal::{Refusal, RefusalCode, EXIT_REFUSAL};
use crate::remediation::{RemediationLoop, RepairContext, StrategyRegistry};
use crate::result::{FailureClass, GateResult};
use crate::runlog::{FindingsSummary, Runlog, RunlogStep, StepStatus};
use crate::writer::ArtifactWriter;
use chrono::NaiveDate;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use xstack_audit::{default_registry, diff_findings, AnalyzerContext, DerivedContractAnalyzer, FindingsReport};
use xstack_cache::CacheStore;
use xstack_canon::CanonicalArtifact;
use xstack_kernel::{
    compose_plan, ExecutorOptions, GroupOutcome, GroupRegistry, GroupRunner, PlanExecutor, PlanRequest,
    Profile, RunnerOptions,
};
use xstack_workspace::{Workspace, WorkspaceSpec};

/// Findings snapshot, repo-relative
pub const FINDINGS_FILE: &str = "docs/audit/auditx/FINDINGS.json";

/// Findings trend against the previous snapshot, repo-relative
pub const FINDINGS_TREND_FILE: &str = "docs/audit/auditx/FINDINGS_TREND.json";

/// Schema id of the findings trend view
pub const FINDINGS_TREND_SCHEMA_ID: &str = "xstack.auditx.findings_trend";

/// Workspace discriminator variable
pub const WS_ID_ENV: &str = "DOM_WS_ID";

/// Release-branch flag variable
pub const RELEASE_BRANCH_ENV: &str = "DOM_RELEASE_BRANCH";

/// Drops the TestX suite from the plan
pub const SKIP_TESTX_ENV: &str = "DOM_XSTACK_SKIP_TESTX";

/// Named entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// FAST
    Precheck,
    /// STRICT
    Verify,
    /// DEEP
    Exitcheck,
}

impl EntryPoint {
    /// All entry points
    pub const ALL: [Self; 3] = [Self::Precheck, Self::Verify, Self::Exitcheck];

    /// Profile this entry point runs
    #[must_use]
    pub fn profile(self) -> Profile {
        match self {
            Self::Precheck => Profile::Fast,
            Self::Verify => Profile::Strict,
            Self::Exitcheck => Profile::Deep,
        }
    }

    /// CLI name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Precheck => "precheck",
            Self::Verify => "verify",
            Self::Exitcheck => "exitcheck",
        }
    }

    /// Parse a CLI name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gate invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest {
    /// Repository root
    pub repo_root: PathBuf,
    /// Entry label recorded in the runlog
    pub entry: String,
    /// Profile
    pub profile: Profile,
    /// Explicit workspace discriminator
    pub workspace_id: Option<String>,
    /// Restrict the plan to these groups and their dependencies
    pub only_gate: Vec<String>,
    /// Write the identity manifest and findings snapshot at any profile
    pub snapshot_mode: bool,
    /// Use the group cache
    pub cache_enabled: bool,
    /// Date used for override expiry; UTC today when unset
    pub today: Option<NaiveDate>,
    /// Host environment (`DOM_*` variables, `PATH`, ...)
    pub host_env: BTreeMap<String, String>,
}

impl GateRequest {
    /// Request for a named entry point
    pub fn new(repo_root: impl Into<PathBuf>, entry: EntryPoint) -> Self {
        Self {
            entry: entry.as_str().to_owned(),
            ..Self::for_profile(repo_root, entry.profile())
        }
    }

    /// Request for a bare profile (`xstack run`)
    pub fn for_profile(repo_root: impl Into<PathBuf>, profile: Profile) -> Self {
        Self {
            repo_root: repo_root.into(),
            entry: "run".to_owned(),
            profile,
            workspace_id: None,
            only_gate: Vec::new(),
            snapshot_mode: false,
            cache_enabled: true,
            today: None,
            host_env: BTreeMap::new(),
        }
    }

    /// Set the workspace discriminator
    #[must_use]
    pub fn with_workspace_id(mut self, id: impl Into<String>) -> Self {
        self.workspace_id = Some(id.into());
        self
    }

    /// Restrict to `gates`
    #[must_use]
    pub fn with_only_gate(mut self, gates: Vec<String>) -> Self {
        self.only_gate = gates;
        self
    }

    /// Enable snapshot mode
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot_mode = snapshot;
        self
    }

    /// Enable or disable the group cache
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Pin the date used for override expiry
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Replace the host environment
    #[must_use]
    pub fn with_host_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.host_env = env;
        self
    }

    fn env(&self, key: &str) -> Option<&str> {
        self.host_env.get(key).map(String::as_str)
    }

    fn discriminator(&self) -> Option<String> {
        self.workspace_id
            .clone()
            .or_else(|| self.env(WS_ID_ENV).map(str::to_owned))
            .filter(|id| !id.trim().is_empty())
    }

    fn is_release(&self) -> bool {
        is_truthy(self.env(RELEASE_BRANCH_ENV))
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    fn writes_snapshots(&self) -> bool {
        self.profile == Profile::Deep || self.snapshot_mode
    }
}

/// What a gate invocation produced
#[derive(Debug, Clone, PartialEq)]
pub struct GateReport {
    /// Result and exit code
    pub result: GateResult,
    /// Workspace id, when one was derived
    pub workspace_id: Option<String>,
    /// Absolute path of the runlog, when it was written
    pub runlog_path: Option<PathBuf>,
    /// Unresolved refusal tokens, sorted
    pub refusal_tokens: Vec<String>,
    /// Refusals raised by the driver
    pub refusals: Vec<Refusal>,
    /// Semantic blockers
    pub blockers: Vec<Blocker>,
    /// The run was cancelled or hit the plan deadline
    pub cancelled: bool,
}

impl GateReport {
    /// Process exit code
    #[must_use]
    pub fn returncode(&self) -> i32 {
        self.result.returncode
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.result.output
    }

    fn refused(request: &GateRequest, error: &GateError, started: Instant) -> Self {
        let refusal = error.refusal();
        let mut result = GateResult::new(&BTreeSet::new(), false);
        result.returncode = refusal.exit_code();
        result.total_seconds = started.elapsed().as_secs_f64();
        result.output = format!(
            "xstack {}: REFUSED rc={} {}",
            request.entry, result.returncode, refusal
        );
        Self {
            result,
            workspace_id: None,
            runlog_path: None,
            refusal_tokens: vec![refusal.code.as_str().to_owned()],
            refusals: vec![refusal],
            blockers: Vec::new(),
            cancelled: false,
        }
    }
}

/// Mutable state of one run
struct Run {
    log: Runlog,
    classes: BTreeSet<FailureClass>,
    refused: bool,
    cache_hits: usize,
    cache_misses: usize,
}

impl Run {
    fn new(workspace: &Workspace, request: &GateRequest) -> Self {
        Self {
            log: Runlog::new(workspace.id().as_str(), request.entry.clone(), request.profile),
            classes: BTreeSet::new(),
            refused: false,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    fn refuse(&mut self, refusal: Refusal) {
        tracing::warn!(code = %refusal.code, message = %refusal.message, "refusal");
        match refusal.code {
            RefusalCode::CanonicalDrift => {
                self.classes.insert(FailureClass::CanonicalDrift);
            }
            RefusalCode::SemanticEscalationRequired => {
                self.classes.insert(FailureClass::Semantic);
            }
            RefusalCode::ToolMissing | RefusalCode::MechanicalFailure => {
                self.classes.insert(FailureClass::Mechanical);
            }
            _ => {}
        }
        if refusal.exit_code() == EXIT_REFUSAL {
            self.refused = true;
        }
        self.log.refusals.push(refusal);
    }

    fn can_write_canonical(&self, cancel: &CancellationToken) -> bool {
        !self.log.cancelled && !cancel.is_cancelled()
    }
}

/// Runs gate requests under one configuration
#[derive(Debug, Clone)]
pub struct GateDriver {
    config: GateConfig,
    remediation: RemediationLoop,
}

impl GateDriver {
    /// Driver with the built-in strategies plus the configured commands
    ///
    /// # Errors
    /// Unknown repair families or a family without two strategy classes
    pub fn new(config: GateConfig) -> Result<Self, GateError> {
        let strategies = StrategyRegistry::with_defaults(&config.repair_commands)?;
        Ok(Self::with_strategies(config, strategies))
    }

    /// Driver with an explicit strategy registry
    #[must_use]
    pub fn with_strategies(config: GateConfig, strategies: StrategyRegistry) -> Self {
        let remediation = RemediationLoop::new(strategies, config.max_retries);
        Self { config, remediation }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run one gate request to completion
    ///
    /// Never fails: errors become refusals and are reflected in the exit
    /// code. Once the workspace exists a runlog is always written.
    pub async fn run(&self, request: &GateRequest, cancel: &CancellationToken) -> GateReport {
        let started = Instant::now();
        tracing::info!(
            entry = %request.entry,
            profile = %request.profile,
            repo = %request.repo_root.display(),
            "gate run starting"
        );

        // 1. Derive the workspace and provision tools
        let workspace = match self.prepare_workspace(request).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!(error = %e, "workspace setup failed");
                return GateReport::refused(request, &e, started);
            }
        };
        let writer = ArtifactWriter::new(Arc::clone(&workspace));
        let mut run = Run::new(&workspace, request);

        if let Err(e) = self.drive(request, &workspace, &writer, &mut run, cancel).await {
            if cancel.is_cancelled() {
                tracing::warn!(error = %e, "run interrupted");
                run.log.cancelled = true;
            } else {
                run.refuse(e.refusal());
            }
        }
        if cancel.is_cancelled() {
            run.log.cancelled = true;
        }
        self.finish(request, &workspace, &writer, run, started)
    }

    async fn prepare_workspace(&self, request: &GateRequest) -> Result<Arc<Workspace>, GateError> {
        let spec = WorkspaceSpec::new(&request.repo_root)
            .with_seed(self.config.seed.clone())
            .with_discriminator(request.discriminator())
            .with_host_env(request.host_env.clone());
        let tools_source = PathBuf::from(&self.config.tools_source);
        blocking(move || {
            let ws = Workspace::create(&spec)?;
            let provisioned = ws.provision_tools(&tools_source)?;
            tracing::info!(ws = %ws.id().as_str(), tools = provisioned, "workspace ready");
            Ok(Arc::new(ws))
        })
        .await
    }

    async fn drive(
        &self,
        request: &GateRequest,
        workspace: &Arc<Workspace>,
        writer: &ArtifactWriter,
        run: &mut Run,
        cancel: &CancellationToken,
    ) -> Result<(), GateError> {
        let repo_root = workspace.repo_root().to_path_buf();
        let cache = CacheStore::new(&repo_root, workspace.id());
        let today = request.today();

        // 2. Restore or build the graph
        let phase = Instant::now();
        let graph = load_graph(&repo_root, &cache, cancel).await?;
        run.log.time("graph", phase.elapsed().as_secs_f64());

        // 3. Override ledger
        let overrides = OverrideLedger::load(&repo_root, request.is_release())?;
        if let Some(line) = overrides.forbidden_violation() {
            run.refuse(Refusal::new(RefusalCode::OverrideForbidden, line));
        }
        let ctx = GateContext {
            repo_root,
            workspace: Arc::clone(workspace),
            graph,
            cache,
            overrides,
        };

        // 4. Compose the plan
        let registry = Arc::new(GroupRegistry::load(&ctx.repo_root, &self.config.groups_file)?);
        let plan_request = PlanRequest::new(request.profile)
            .with_only_gate(request.only_gate.clone())
            .with_skip_testx(is_truthy(request.env(SKIP_TESTX_ENV)));
        let plan = compose_plan(&registry, &plan_request)?;
        run.log.plan_hash = plan.plan_hash.clone();
        run.log.plan = plan.payload();

        // 5. Execute the layers
        let options = RunnerOptions::new(request.profile)
            .with_cache(request.cache_enabled)
            .with_changed_files(changed_files(&request.host_env))
            .with_group_timeout(self.config.group_timeout())
            .with_grace(self.config.cancel_grace());
        let runner = Arc::new(GroupRunner::new(Arc::clone(&ctx.workspace), ctx.cache.clone(), options));
        let executor_options = ExecutorOptions::default()
            .with_max_workers(self.config.max_workers)
            .with_plan_timeout(self.config.plan_timeout());
        let executor = PlanExecutor::new(Arc::clone(&runner), Arc::clone(&registry), executor_options);
        let report = executor.execute(&plan, cancel).await?;
        run.log.time("execute", report.seconds);
        run.log.cancelled = report.cancelled || report.plan_timed_out;
        run.cache_hits = report.cache_hits();
        run.cache_misses = report.cache_misses();

        if !report.escaped_paths.is_empty() {
            run.log.escaped_paths = report.escaped_paths.clone();
            let refusal = Refusal::new(
                RefusalCode::WorkspaceEscape,
                format!("{} path(s) written outside the allow-list", report.escaped_paths.len()),
            )
            .with_details(json!({ "paths": report.escaped_paths }));
            run.refuse(refusal);
        }

        // 6. Waivers, remediation, escalation
        let phase = Instant::now();
        let repair = RepairContext::new(Arc::clone(&ctx.workspace), ctx.cache.clone(), self.config.tools_source.clone())
            .with_command_timeout(self.config.group_timeout())
            .with_cancellation(cancel.clone());
        for outcome in &report.outcomes {
            let step = self
                .settle(&ctx, &repair, &runner, &registry, outcome, today, run, cancel)
                .await?;
            run.log.steps.push(step);
        }
        run.log.time("remediation", phase.elapsed().as_secs_f64());

        // 7. Analyzers and findings snapshot
        if request.writes_snapshots() && run.can_write_canonical(cancel) {
            let phase = Instant::now();
            self.audit(&ctx, writer, run, today).await?;
            run.log.time("audit", phase.elapsed().as_secs_f64());
        }

        // 8. Performance ceiling on cold strict runs
        if request.profile.is_cold()
            && report.cache_misses() > 0
            && report.seconds > self.config.performance_ceiling_seconds
        {
            tracing::warn!(
                seconds = report.seconds,
                ceiling = self.config.performance_ceiling_seconds,
                "performance ceiling exceeded"
            );
            run.classes.insert(FailureClass::Performance);
        }

        // 9. Identity manifest
        if request.writes_snapshots() && run.can_write_canonical(cancel) {
            let root = ctx.repo_root.clone();
            let manifest = blocking(move || IdentityManifest::build(&root)).await?;
            writer.write_canonical(Path::new(IDENTITY_MANIFEST_FILE), &manifest.to_artifact())?;
            run.log.identity_fingerprint = Some(manifest.fingerprint_sha256);
        }
        Ok(())
    }

    /// Decide what one group's outcome means for the run
    #[allow(clippy::too_many_arguments)]
    async fn settle(
        &self,
        ctx: &GateContext,
        repair: &RepairContext,
        runner: &GroupRunner,
        registry: &GroupRegistry,
        outcome: &GroupOutcome,
        today: NaiveDate,
        run: &mut Run,
        cancel: &CancellationToken,
    ) -> Result<RunlogStep, GateError> {
        if outcome.passed() {
            return Ok(RunlogStep::from_outcome(outcome, StepStatus::Passed));
        }
        if outcome.cancelled {
            run.classes.insert(FailureClass::Mechanical);
            return Ok(RunlogStep::from_outcome(outcome, StepStatus::Cancelled)
                .with_failure_class(FailureClass::Mechanical));
        }
        if ctx.overrides.waives(outcome, today) {
            tracing::info!(group = %outcome.group_id, tokens = ?outcome.refusal_tokens, "failure waived by override");
            return Ok(RunlogStep::from_outcome(outcome, StepStatus::Waived));
        }

        let keywords = &self.config.escalation_keywords;
        let first = route(outcome, keywords, &[]);
        let class = first.classification.class;
        if class != FailureClass::Mechanical {
            run.classes.insert(class);
            let mut step = RunlogStep::from_outcome(outcome, StepStatus::Failed).with_failure_class(class);
            if let Some(blocker) = first.blocker {
                step = step.with_blocker(&blocker);
                run.log.blockers.push(blocker);
            }
            return Ok(step);
        }

        let group = match registry.get(&outcome.group_id) {
            Some(group) if !cancel.is_cancelled() => group,
            _ => {
                run.classes.insert(FailureClass::Mechanical);
                return Ok(RunlogStep::from_outcome(outcome, StepStatus::Failed)
                    .with_failure_class(FailureClass::Mechanical));
            }
        };

        let record = self
            .remediation
            .remediate(repair, runner, group, outcome.clone(), cancel)
            .await?;
        let step = RunlogStep::from_outcome(outcome, StepStatus::Failed);
        if record.resolved() {
            tracing::info!(group = %outcome.group_id, attempts = record.attempts.len(), "remediated");
            let mut step = step.with_remediation(record);
            step.status = StepStatus::Remediated;
            return Ok(step);
        }

        let attempted: Vec<String> = record.attempted_classes().into_iter().map(str::to_owned).collect();
        let escalation = route(&record.final_outcome, keywords, &attempted);
        let class = escalation.classification.class;
        run.classes.insert(class);
        let mut step = step.with_remediation(record).with_failure_class(class);
        if let Some(blocker) = escalation.blocker {
            step = step.with_blocker(&blocker);
            run.log.blockers.push(blocker);
        }
        Ok(step)
    }

    async fn audit(
        &self,
        ctx: &GateContext,
        writer: &ArtifactWriter,
        run: &mut Run,
        today: NaiveDate,
    ) -> Result<(), GateError> {
        let analyzers = default_registry(&self.config.audit);
        let analyzer_ctx = AnalyzerContext::new(ctx.repo_root.clone(), Arc::clone(&ctx.graph));
        let findings = blocking(move || Ok(analyzers.run(&analyzer_ctx))).await?;

        let mut report = FindingsReport::new(findings);
        let deferred = ctx.overrides.defer_findings(&mut report, today);

        let previous = match FindingsReport::load(&ctx.repo_root.join(FINDINGS_FILE)) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(error = %e, "previous findings unreadable, diffing against nothing");
                None
            }
        };
        let diff = diff_findings(
            previous.as_ref().map_or(&[][..], FindingsReport::findings),
            report.findings(),
        );

        let drifted: Vec<&str> = report
            .open_violations()
            .filter(|f| f.analyzer_id == DerivedContractAnalyzer::ID)
            .map(|f| f.location.file.as_str())
            .collect();
        if !drifted.is_empty() {
            run.refuse(
                Refusal::new(
                    RefusalCode::CanonicalDrift,
                    format!("{} canonical artifact(s) carry run metadata", drifted.len()),
                )
                .with_details(json!({ "paths": drifted })),
            );
        }

        writer.write_canonical(Path::new(FINDINGS_FILE), &report.to_artifact())?;
        let trend = CanonicalArtifact::derived_view(FINDINGS_TREND_SCHEMA_ID, "1.0.0", json!(diff));
        writer.write_derived_view(Path::new(FINDINGS_TREND_FILE), &trend)?;

        tracing::info!(
            findings = report.len(),
            deferred,
            added = diff.added.len(),
            resolved = diff.resolved.len(),
            "findings written"
        );
        run.log.findings = Some(FindingsSummary {
            total: report.len(),
            added: diff.added.len(),
            resolved: diff.resolved.len(),
        });
        Ok(())
    }

    fn finish(
        &self,
        request: &GateRequest,
        workspace: &Workspace,
        writer: &ArtifactWriter,
        mut run: Run,
        started: Instant,
    ) -> GateReport {
        if run.log.cancelled {
            run.classes.insert(FailureClass::Mechanical);
        }

        let mut result = GateResult::new(&run.classes, run.refused);
        result.cache_hits = run.cache_hits;
        result.cache_misses = run.cache_misses;
        result.total_seconds = started.elapsed().as_secs_f64();

        let mut tokens: BTreeSet<String> = run
            .log
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Cancelled))
            .flat_map(|s| s.refusal_tokens.iter().cloned())
            .collect();
        tokens.extend(run.log.refusals.iter().map(|r| r.code.as_str().to_owned()));
        let refusal_tokens: Vec<String> = tokens.into_iter().collect();

        let primary = result
            .primary_failure_class
            .map(FailureClass::as_str)
            .or_else(|| run.log.refusals.first().map(|r| r.code.as_str()))
            .unwrap_or("none");
        result.output = format!(
            "xstack {}: {} rc={} profile={} groups={} cache_hits={} cache_misses={} primary={} ws={}",
            request.entry,
            if result.passed() { "PASS" } else { "FAIL" },
            result.returncode,
            request.profile,
            run.log.steps.len(),
            result.cache_hits,
            result.cache_misses,
            primary,
            workspace.id().as_str(),
        );

        run.log.result = result.clone();
        run.log.refusal_tokens = refusal_tokens.clone();
        let runlog_path = match run.log.write(writer) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!(error = %e, "runlog not written");
                None
            }
        };
        tracing::info!(
            rc = result.returncode,
            primary,
            seconds = result.total_seconds,
            cancelled = run.log.cancelled,
            "gate run finished"
        );

        GateReport {
            result,
            workspace_id: Some(workspace.id().as_str().to_owned()),
            runlog_path,
            refusal_tokens,
            refusals: run.log.refusals,
            blockers: run.log.blockers,
            cancelled: run.log.cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_outputs_are_left_out_of_dependency_hashes() {
        for file in [FINDINGS_FILE, FINDINGS_TREND_FILE, crate::IDENTITY_MANIFEST_FILE] {
            assert!(xstack_kernel::DRIVER_OUTPUT_FILES.contains(&file), "{file}");
        }
    }

    #[test]
    fn entry_points_map_to_profiles() {
        assert_eq!(EntryPoint::Precheck.profile(), Profile::Fast);
        assert_eq!(EntryPoint::Verify.profile(), Profile::Strict);
        assert_eq!(EntryPoint::Exitcheck.profile(), Profile::Deep);
        assert_eq!(EntryPoint::parse("verify"), Some(EntryPoint::Verify));
        assert_eq!(EntryPoint::parse("deploy"), None);
    }

    #[test]
    fn request_reads_the_host_environment() {
        let env: BTreeMap<String, String> = [
            (WS_ID_ENV.to_owned(), "ci-7".to_owned()),
            (RELEASE_BRANCH_ENV.to_owned(), "true".to_owned()),
        ]
        .into_iter()
        .collect();
        let request = GateRequest::new("/repo", EntryPoint::Verify).with_host_env(env);
        assert_eq!(request.entry, "verify");
        assert_eq!(request.discriminator().as_deref(), Some("ci-7"));
        assert!(request.is_release());
        assert!(!request.writes_snapshots());

        let explicit = request.with_workspace_id("mine").with_snapshot(true);
        assert_eq!(explicit.discriminator().as_deref(), Some("mine"));
        assert!(explicit.writes_snapshots());
    }

    #[test]
    fn refused_report_carries_the_code() {
        let request = GateRequest::for_profile("/repo", Profile::Fast);
        let report = GateReport::refused(
            &request,
            &GateError::invalid_input("bad"),
            Instant::now(),
        );
        assert_eq!(report.returncode(), 2);
        assert_eq!(report.refusal_tokens, vec!["REFUSE_INVALID_INPUT".to_owned()]);
        assert!(report.summary().contains("REFUSED"));
    }
}
