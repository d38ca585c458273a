//! Group runner
//!
//! Runs one check group: hash its dependencies, probe the cache, otherwise
//! resolve the tool on the workspace `PATH` and spawn it. Exit-0 results and
//! deterministic failures are written back; timeouts, cancellations and
//! missing tools never are.

use crate::error::{KernelError, KernelResult};
use crate::group::{dep_hash, CheckGroup};
use crate::process::{run_process, ExitKind, ProcessSpec, TOOL_MISSING_RETURNCODE};
use crate::profile::Profile;
use crate::tokens::{refusal, refusal_tokens_in, split_refusal};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use xstack_cache::{CacheKey, CacheStore, GROUP_DOMAIN};
use xstack_canon::CanonicalArtifact;
use xstack_workspace::Workspace;

/// Schema of cached group results
pub const GROUP_RESULT_SCHEMA_ID: &str = "xstack.group_result";

/// Schema version of cached group results
pub const GROUP_RESULT_SCHEMA_VERSION: &str = "1.0.0";

/// Default per-group soft timeout
pub const DEFAULT_GROUP_TIMEOUT: Duration = Duration::from_secs(600);

/// Default SIGTERM → SIGKILL grace
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

const REPO_ROOT_FLAG: &str = "--repo-root";

/// Runner knobs shared by every group of a run
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Active profile
    pub profile: Profile,
    /// Read and write the group cache
    pub cache_enabled: bool,
    /// Changed files for incremental runs; `None` means unknown
    pub changed_files: Option<Vec<String>>,
    /// Soft timeout for groups without their own
    pub group_timeout: Duration,
    /// Grace between SIGTERM and SIGKILL
    pub grace: Duration,
}

impl RunnerOptions {
    /// Defaults for `profile`
    #[must_use]
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            cache_enabled: true,
            changed_files: None,
            group_timeout: DEFAULT_GROUP_TIMEOUT,
            grace: DEFAULT_GRACE,
        }
    }

    /// Enable or disable the cache
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the changed-file list
    #[must_use]
    pub fn with_changed_files(mut self, changed: Option<Vec<String>>) -> Self {
        self.changed_files = changed;
        self
    }

    /// Set the soft timeout
    #[must_use]
    pub fn with_group_timeout(mut self, timeout: Duration) -> Self {
        self.group_timeout = timeout;
        self
    }

    /// Set the kill grace
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

/// Result of running one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOutcome {
    /// Group id
    pub group_id: String,
    /// Profile the group ran under
    pub profile: Profile,
    /// Dependency hash the result belongs to
    pub dep_hash: String,
    /// Child return code
    pub returncode: i32,
    /// Sorted non-empty output lines on failure
    pub violations: Vec<String>,
    /// Distinct refusal tokens in the violations
    pub refusal_tokens: Vec<String>,
    /// Served from the cache
    pub cache_hit: bool,
    /// A child process was started
    pub spawned: bool,
    /// Killed by the soft timeout
    pub timed_out: bool,
    /// Killed by cancellation
    pub cancelled: bool,
    /// Wall time
    pub seconds: f64,
}

impl GroupOutcome {
    fn empty(group: &CheckGroup, profile: Profile, dep_hash: String) -> Self {
        Self {
            group_id: group.group_id.clone(),
            profile,
            dep_hash,
            returncode: 0,
            violations: Vec::new(),
            refusal_tokens: Vec::new(),
            cache_hit: false,
            spawned: false,
            timed_out: false,
            cancelled: false,
            seconds: 0.0,
        }
    }

    fn with_violations(mut self, returncode: i32, mut violations: Vec<String>) -> Self {
        violations.retain(|line| !line.trim().is_empty());
        violations.sort();
        violations.dedup();
        self.refusal_tokens = refusal_tokens_in(violations.iter().map(String::as_str))
            .into_iter()
            .collect();
        self.returncode = returncode;
        self.violations = violations;
        self
    }

    /// Exit 0
    #[must_use]
    pub fn passed(&self) -> bool {
        self.returncode == 0
    }

    /// Failure caused by the environment rather than the checked content
    ///
    /// A timeout, or a `refuse.tool_missing.*` token. Exit code 127 alone is
    /// a checker's own verdict.
    #[must_use]
    pub fn is_mechanical_refusal(&self) -> bool {
        self.timed_out
            || self
                .refusal_tokens
                .iter()
                .any(|token| split_refusal(token).is_some_and(|(family, _)| family == TOOL_MISSING_FAMILY))
    }

    fn cache_record(&self) -> serde_json::Value {
        json!({
            "group_id": self.group_id,
            "profile": self.profile,
            "dep_hash": self.dep_hash,
            "returncode": self.returncode,
            "violations": self.violations,
        })
    }

    fn from_cached(group: &CheckGroup, profile: Profile, artifact: &CanonicalArtifact) -> Option<Self> {
        #[derive(Deserialize)]
        struct Cached {
            dep_hash: String,
            returncode: i32,
            violations: Vec<String>,
        }
        if artifact.schema_id != GROUP_RESULT_SCHEMA_ID {
            return None;
        }
        let cached: Cached = serde_json::from_value(artifact.record.clone()).ok()?;
        let mut outcome = Self::empty(group, profile, cached.dep_hash)
            .with_violations(cached.returncode, cached.violations);
        outcome.cache_hit = true;
        Some(outcome)
    }
}

/// Runs check groups inside one workspace
#[derive(Debug, Clone)]
pub struct GroupRunner {
    ws: Arc<Workspace>,
    cache: CacheStore,
    options: RunnerOptions,
}

impl GroupRunner {
    /// Runner over `ws` and `cache`
    #[must_use]
    pub fn new(ws: Arc<Workspace>, cache: CacheStore, options: RunnerOptions) -> Self {
        Self { ws, cache, options }
    }

    /// Active options
    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Workspace the runner spawns into
    #[must_use]
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.ws
    }

    /// Cache the runner reads and writes
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn command_args(&self, group: &CheckGroup) -> Vec<String> {
        let mut args: Vec<String> = group.runner_command.iter().skip(1).cloned().collect();
        if !args.iter().any(|a| a == REPO_ROOT_FLAG || a.starts_with("--repo-root=")) {
            args.push(REPO_ROOT_FLAG.to_owned());
            args.push(self.ws.repo_root().to_string_lossy().into_owned());
        }
        args
    }

    /// Run `group`
    ///
    /// # Errors
    /// Dependency hashing, cache IO or spawn failures other than a missing tool
    pub async fn run(&self, group: &CheckGroup, cancel: &CancellationToken) -> KernelResult<GroupOutcome> {
        let started = Instant::now();
        let profile = self.options.profile;

        let root = self.ws.repo_root().to_path_buf();
        let hashed = group.clone();
        let digest = tokio::task::spawn_blocking(move || dep_hash(&root, &hashed))
            .await
            .map_err(|e| KernelError::Task(e.to_string()))??
            .to_hex();
        let key = CacheKey::group(&group.group_id, profile.as_str(), &digest);
        let base = GroupOutcome::empty(group, profile, digest);

        if self.options.cache_enabled {
            let impacted = self
                .options
                .changed_files
                .as_deref()
                .map(|changed| group.impacted_by(changed));
            if profile == Profile::Fast || impacted == Some(false) {
                if let Some(hit) = self.cache.get(GROUP_DOMAIN, key.as_str()).await? {
                    if let Some(mut outcome) = GroupOutcome::from_cached(group, profile, &hit.artifact) {
                        tracing::debug!(group = %group.group_id, "group cache hit");
                        outcome.seconds = started.elapsed().as_secs_f64();
                        return Ok(outcome);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            let mut outcome = base.with_violations(crate::process::CANCELLED_RETURNCODE, Vec::new());
            outcome.cancelled = true;
            return Ok(outcome);
        }

        let tool = group.runner_id();
        let Some(program) = self.ws.resolve_tool(tool) else {
            return Ok(tool_missing(base, tool, started));
        };
        let spec = ProcessSpec {
            program,
            args: self.command_args(group),
            env: self.ws.env().clone(),
            cwd: self.ws.repo_root().to_path_buf(),
            timeout: group
                .timeout_secs
                .map_or(self.options.group_timeout, Duration::from_secs),
            grace: self.options.grace,
        };

        tracing::info!(group = %group.group_id, tool, "running group");
        let output = match run_process(&spec, cancel).await {
            Ok(output) => output,
            Err(KernelError::Spawn { source, .. })
                if matches!(
                    source.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
                ) =>
            {
                return Ok(tool_missing(base, tool, started));
            }
            Err(e) => return Err(e),
        };

        let returncode = output.returncode();
        let mut outcome = match output.exit {
            ExitKind::Exited(0) => base.with_violations(0, Vec::new()),
            ExitKind::Exited(code) => base.with_violations(code, output.lines),
            ExitKind::TimedOut => {
                let mut lines = output.lines;
                lines.push(refusal("timeout", &group.group_id));
                let mut outcome = base.with_violations(returncode, lines);
                outcome.timed_out = true;
                outcome
            }
            ExitKind::Cancelled => {
                let mut outcome = base.with_violations(returncode, output.lines);
                outcome.cancelled = true;
                outcome
            }
        };
        outcome.spawned = true;
        outcome.seconds = started.elapsed().as_secs_f64();

        if outcome.cancelled {
            self.cache.discard(GROUP_DOMAIN, key.as_str()).await?;
        } else if self.options.cache_enabled && !outcome.timed_out {
            let artifact = CanonicalArtifact::canonical(
                GROUP_RESULT_SCHEMA_ID,
                GROUP_RESULT_SCHEMA_VERSION,
                outcome.cache_record(),
            );
            if let Err(e) = self.cache.put(GROUP_DOMAIN, key.as_str(), &artifact).await {
                tracing::warn!(group = %group.group_id, error = %e, "failed to cache group result");
            }
        }

        tracing::info!(
            group = %outcome.group_id,
            returncode = outcome.returncode,
            seconds = outcome.seconds,
            "group finished"
        );
        Ok(outcome)
    }
}

/// Refusal family for executables absent from the workspace `PATH`
const TOOL_MISSING_FAMILY: &str = "tool_missing";

fn tool_missing(base: GroupOutcome, tool: &str, started: Instant) -> GroupOutcome {
    let token = refusal(TOOL_MISSING_FAMILY, tool);
    tracing::warn!(group = %base.group_id, tool, "tool not found on workspace PATH");
    let mut outcome = base.with_violations(
        TOOL_MISSING_RETURNCODE,
        vec![format!("{token}: {tool} not found on workspace PATH")],
    );
    outcome.seconds = started.elapsed().as_secs_f64();
    outcome
}
