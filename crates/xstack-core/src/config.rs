//! Gate configuration
//!
//! Defaults, overlaid by an optional `<repo>/.xstack.toml`, overlaid by
//! `DOM_XSTACK_*` environment variables.

use crate::error::GateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use xstack_audit::AnalyzerConfig;
use xstack_kernel::{default_workers, DEFAULT_GROUPS_FILE, MAX_WORKERS};
use xstack_workspace::{DEFAULT_SEED, DEFAULT_TOOLS_SOURCE};

/// Config file name at the repo root
pub const CONFIG_FILE: &str = ".xstack.toml";

/// Lower bound on remediation attempts per group
pub const MIN_RETRIES: usize = 2;

/// Upper bound on remediation attempts per group
pub const MAX_RETRIES: usize = 5;

/// A strategy backed by an external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairCommand {
    /// Strategy class name
    pub name: String,
    /// Repair family it applies to (`TOOL_MISSING`, `TIMEOUT`, ...)
    pub family: String,
    /// Program and arguments, resolved against the workspace `PATH`
    pub command: Vec<String>,
}

/// Gate driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Concurrent groups per layer (clamped to `[1, 16]`)
    pub max_workers: usize,
    /// Soft timeout per group
    pub group_timeout_secs: u64,
    /// Hard timeout for the whole plan; 0 disables it
    pub plan_timeout_secs: u64,
    /// Grace between SIGTERM and SIGKILL
    pub cancel_grace_secs: u64,
    /// Remediation attempts per group (clamped to `[2, 5]`)
    pub max_retries: usize,
    /// Strict cold ceiling before PERFORMANCE is added
    pub performance_ceiling_seconds: f64,
    /// Group registry, repo-relative
    pub groups_file: String,
    /// Tool source directory, repo-relative
    pub tools_source: String,
    /// Workspace id seed
    pub seed: String,
    /// Output phrases that force a semantic escalation
    pub escalation_keywords: Vec<String>,
    /// Extra command-backed repair strategies
    pub repair_commands: Vec<RepairCommand>,
    /// Analyzer settings
    pub audit: AnalyzerConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_workers: default_workers(),
            group_timeout_secs: 600,
            plan_timeout_secs: 0,
            cancel_grace_secs: 5,
            max_retries: 3,
            performance_ceiling_seconds: 600.0,
            groups_file: DEFAULT_GROUPS_FILE.to_owned(),
            tools_source: DEFAULT_TOOLS_SOURCE.to_owned(),
            seed: DEFAULT_SEED.to_owned(),
            escalation_keywords: vec![
                "needs human decision".to_owned(),
                "policy is ambiguous".to_owned(),
            ],
            repair_commands: Vec::new(),
            audit: AnalyzerConfig::default(),
        }
    }
}

impl GateConfig {
    /// Defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<repo_root>/.xstack.toml` (if present) and apply `env`
    ///
    /// # Errors
    /// Unreadable or malformed config file, malformed env values
    pub fn load(repo_root: &Path, env: &BTreeMap<String, String>) -> Result<Self, GateError> {
        let path = repo_root.join(CONFIG_FILE);
        let config = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(GateError::io_error(path, e)),
        };
        let config = config.with_env(env)?.normalized();
        tracing::debug!(
            workers = config.max_workers,
            retries = config.max_retries,
            "gate config loaded"
        );
        Ok(config)
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// [`GateError::Config`] on malformed TOML
    pub fn from_toml(text: &str) -> Result<Self, GateError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay `DOM_XSTACK_*` variables
    ///
    /// # Errors
    /// [`GateError::InvalidInput`] for non-numeric values
    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Result<Self, GateError> {
        fn parse<T: std::str::FromStr>(env: &BTreeMap<String, String>, key: &str) -> Result<Option<T>, GateError> {
            env.get(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| {
                    v.trim()
                        .parse::<T>()
                        .map_err(|_| GateError::invalid_input(format!("{key}={v} is not a number")))
                })
                .transpose()
        }
        if let Some(v) = parse(env, "DOM_XSTACK_MAX_WORKERS")? {
            self.max_workers = v;
        }
        if let Some(v) = parse(env, "DOM_XSTACK_GROUP_TIMEOUT")? {
            self.group_timeout_secs = v;
        }
        if let Some(v) = parse(env, "DOM_XSTACK_PLAN_TIMEOUT")? {
            self.plan_timeout_secs = v;
        }
        if let Some(v) = parse(env, "DOM_XSTACK_MAX_RETRIES")? {
            self.max_retries = v;
        }
        if let Some(v) = parse(env, "DOM_XSTACK_PERF_CEILING")? {
            self.performance_ceiling_seconds = v;
        }
        Ok(self)
    }

    /// Clamp bounded knobs
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_workers = self.max_workers.clamp(1, MAX_WORKERS);
        self.max_retries = self.max_retries.clamp(MIN_RETRIES, MAX_RETRIES);
        self
    }

    /// Set the worker bound
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    /// Set the per-group timeout
    #[must_use]
    pub fn with_group_timeout_secs(mut self, secs: u64) -> Self {
        self.group_timeout_secs = secs;
        self
    }

    /// Set the plan timeout (0 disables)
    #[must_use]
    pub fn with_plan_timeout_secs(mut self, secs: u64) -> Self {
        self.plan_timeout_secs = secs;
        self
    }

    /// Set the kill grace
    #[must_use]
    pub fn with_cancel_grace_secs(mut self, secs: u64) -> Self {
        self.cancel_grace_secs = secs;
        self
    }

    /// Set the retry bound
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries.clamp(MIN_RETRIES, MAX_RETRIES);
        self
    }

    /// Set the performance ceiling
    #[must_use]
    pub fn with_performance_ceiling(mut self, seconds: f64) -> Self {
        self.performance_ceiling_seconds = seconds;
        self
    }

    /// Set the escalation keywords
    #[must_use]
    pub fn with_escalation_keywords(mut self, keywords: Vec<String>) -> Self {
        self.escalation_keywords = keywords;
        self
    }

    /// Add a command-backed repair strategy
    #[must_use]
    pub fn with_repair_command(mut self, command: RepairCommand) -> Self {
        self.repair_commands.push(command);
        self
    }

    /// Per-group timeout
    #[must_use]
    pub fn group_timeout(&self) -> Duration {
        Duration::from_secs(self.group_timeout_secs)
    }

    /// Plan timeout, if enabled
    #[must_use]
    pub fn plan_timeout(&self) -> Option<Duration> {
        (self.plan_timeout_secs > 0).then(|| Duration::from_secs(self.plan_timeout_secs))
    }

    /// Kill grace
    #[must_use]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }
}

/// `1`, `true`, `yes` or `on`, case-insensitive
#[must_use]
pub fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// `DOM_CHANGED_FILES` split on `;`, or `None` when unset
#[must_use]
pub fn changed_files(env: &BTreeMap<String, String>) -> Option<Vec<String>> {
    let raw = env.get("DOM_CHANGED_FILES")?;
    let mut files: Vec<String> = raw
        .split(';')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|f| f.replace('\\', "/"))
        .collect();
    files.sort();
    files.dedup();
    Some(files)
}
