//! Built-in repair strategies
//!
//! Strategies only touch the workspace, the cache and allow-listed paths.
//! A strategy that finds nothing to do still succeeds; the rerun decides
//! whether it helped.

use super::family::{RepairFamily, StrategyClass};
use crate::blocking;
use crate::error::GateError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use xstack_cache::{CacheKey, CacheStore, GROUP_DOMAIN};
use xstack_canon::{write_atomic, ArtifactClass, CanonicalArtifact};
use xstack_kernel::{
    run_process, split_refusal, CheckGroup, GroupOutcome, ProcessSpec, Profile, DEFAULT_GRACE,
};
use xstack_workspace::Workspace;

/// Roots searched by [`ToolUiBind`]
pub const TOOL_SEARCH_ROOTS: [&str; 2] = ["tools", "scripts"];

/// Suffixes tried by [`ToolUiBind`]
const TOOL_SUFFIXES: [&str; 3] = ["", ".sh", ".py"];

/// Directory rewritten by [`CanonicalRewrite`]
pub const AUDIT_ROOT: &str = "docs/audit";

/// Runlog tree, never rewritten
const REMEDIATION_DIR: &str = "remediation";

/// Everything a strategy may touch
#[derive(Debug, Clone)]
pub struct RepairContext {
    workspace: Arc<Workspace>,
    cache: CacheStore,
    tools_source: PathBuf,
    command_timeout: Duration,
    cancel: CancellationToken,
}

impl RepairContext {
    /// Context over `workspace` and `cache`
    #[must_use]
    pub fn new(workspace: Arc<Workspace>, cache: CacheStore, tools_source: impl Into<PathBuf>) -> Self {
        Self {
            workspace,
            cache,
            tools_source: tools_source.into(),
            command_timeout: Duration::from_secs(600),
            cancel: CancellationToken::new(),
        }
    }

    /// Timeout for command-backed strategies
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Cancellation token for command-backed strategies
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Workspace
    #[must_use]
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Cache
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Repo-relative tool source
    #[must_use]
    pub fn tools_source(&self) -> &Path {
        &self.tools_source
    }
}

/// One repair action
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RepairStrategy: Send + Sync {
    /// Class of this strategy
    fn class(&self) -> StrategyClass;

    /// Apply the repair for `group`, whose last run produced `outcome`
    ///
    /// Returns a short note for the runlog.
    async fn apply(
        &self,
        ctx: &RepairContext,
        group: &CheckGroup,
        outcome: &GroupOutcome,
    ) -> Result<String, GateError>;
}

/// Details of `refuse.<family>.<detail>` tokens for `family`
fn token_details<'a>(outcome: &'a GroupOutcome, family: &str) -> Vec<&'a str> {
    outcome
        .refusal_tokens
        .iter()
        .filter_map(|t| split_refusal(t))
        .filter(|(f, detail)| *f == family && !detail.is_empty())
        .map(|(_, detail)| detail)
        .collect()
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Re-provision the tools dir from the tool source
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolDiscovery;

#[async_trait::async_trait]
impl RepairStrategy for ToolDiscovery {
    fn class(&self) -> StrategyClass {
        StrategyClass::ToolDiscovery
    }

    async fn apply(&self, ctx: &RepairContext, _: &CheckGroup, _: &GroupOutcome) -> Result<String, GateError> {
        let ws = Arc::clone(&ctx.workspace);
        let source = ctx.tools_source.clone();
        let count = blocking(move || Ok(ws.provision_tools(&source)?)).await?;
        Ok(format!("provisioned {count} tools from {}", ctx.tools_source.display()))
    }
}

/// Bind a script named like the missing tool into the tools dir
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolUiBind;

fn find_tool_candidate(repo_root: &Path, tool: &str) -> Option<PathBuf> {
    let names: Vec<String> = TOOL_SUFFIXES.iter().map(|s| format!("{tool}{s}")).collect();
    TOOL_SEARCH_ROOTS.iter().find_map(|root| {
        WalkDir::new(repo_root.join(root))
            .max_depth(4)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .find(|e| names.iter().any(|n| e.file_name().to_string_lossy() == n.as_str()))
            .map(walkdir::DirEntry::into_path)
    })
}

#[async_trait::async_trait]
impl RepairStrategy for ToolUiBind {
    fn class(&self) -> StrategyClass {
        StrategyClass::ToolUiBind
    }

    async fn apply(&self, ctx: &RepairContext, group: &CheckGroup, outcome: &GroupOutcome) -> Result<String, GateError> {
        let mut tools: Vec<String> = token_details(outcome, "tool_missing")
            .into_iter()
            .map(str::to_owned)
            .collect();
        if tools.is_empty() {
            tools.push(group.runner_id().to_owned());
        }
        let ws = Arc::clone(&ctx.workspace);
        blocking(move || {
            let tools_dir = ws.dirs().tools_dir.clone();
            std::fs::create_dir_all(&tools_dir).map_err(|e| GateError::io_error(&tools_dir, e))?;
            let mut bound = Vec::new();
            for tool in tools.iter().filter(|t| !t.contains('/')) {
                let Some(src) = find_tool_candidate(ws.repo_root(), tool) else {
                    continue;
                };
                let dest = tools_dir.join(tool);
                std::fs::copy(&src, &dest).map_err(|e| GateError::io_error(&dest, e))?;
                make_executable(&dest).map_err(|e| GateError::io_error(&dest, e))?;
                bound.push(format!("{tool} <- {}", ws.relative(&src).unwrap_or_default()));
            }
            Ok(if bound.is_empty() {
                "no candidate script found".to_owned()
            } else {
                format!("bound {}", bound.join(", "))
            })
        })
        .await
    }
}

/// Recreate the workspace directories and re-provision tools
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceRebuild;

#[async_trait::async_trait]
impl RepairStrategy for WorkspaceRebuild {
    fn class(&self) -> StrategyClass {
        StrategyClass::WorkspaceRebuild
    }

    async fn apply(&self, ctx: &RepairContext, _: &CheckGroup, _: &GroupOutcome) -> Result<String, GateError> {
        let ws = Arc::clone(&ctx.workspace);
        let source = ctx.tools_source.clone();
        blocking(move || {
            let dirs = ws.dirs();
            for dir in dirs.roots().into_iter().chain([dirs.tools_dir.as_path()]) {
                std::fs::create_dir_all(dir).map_err(|e| GateError::io_error(dir, e))?;
            }
            let count = ws.provision_tools(&source)?;
            Ok(format!("rebuilt workspace {} with {count} tools", ws.id()))
        })
        .await
    }
}

/// Drop the group's cached results for every profile
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheInvalidate;

#[async_trait::async_trait]
impl RepairStrategy for CacheInvalidate {
    fn class(&self) -> StrategyClass {
        StrategyClass::CacheInvalidate
    }

    async fn apply(&self, ctx: &RepairContext, group: &CheckGroup, outcome: &GroupOutcome) -> Result<String, GateError> {
        for profile in Profile::ALL {
            let key = CacheKey::group(&group.group_id, profile.as_str(), &outcome.dep_hash);
            ctx.cache.discard(GROUP_DOMAIN, key.as_str()).await?;
        }
        Ok(format!("invalidated cached results of {}", group.group_id))
    }
}

/// Re-serialize CANONICAL artifacts under `docs/audit` in canonical form
///
/// Artifacts carrying run metadata are left alone; drift is never repaired.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalRewrite;

fn rewrite_canonical_tree(root: &Path) -> Result<usize, GateError> {
    let audit = root.join(AUDIT_ROOT);
    let mut rewritten = 0;
    let walker = WalkDir::new(&audit)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == REMEDIATION_DIR));
    for entry in walker.filter_map(Result::ok) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(bytes) = std::fs::read(path) else { continue };
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            continue;
        };
        if value.get("artifact_class").and_then(serde_json::Value::as_str)
            != Some(ArtifactClass::Canonical.as_str())
        {
            continue;
        }
        match CanonicalArtifact::from_value(value).and_then(|a| a.to_bytes()) {
            Ok(canonical) if canonical != bytes => {
                write_atomic(path, &canonical)?;
                rewritten += 1;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping artifact"),
        }
    }
    Ok(rewritten)
}

#[async_trait::async_trait]
impl RepairStrategy for CanonicalRewrite {
    fn class(&self) -> StrategyClass {
        StrategyClass::CanonicalRewrite
    }

    async fn apply(&self, ctx: &RepairContext, _: &CheckGroup, _: &GroupOutcome) -> Result<String, GateError> {
        let root = ctx.workspace.repo_root().to_path_buf();
        let count = blocking(move || rewrite_canonical_tree(&root)).await?;
        Ok(format!("rewrote {count} canonical artifacts"))
    }
}

/// Create directories named by `refuse.path_unresolved.<path>` tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRenormalize;

#[async_trait::async_trait]
impl RepairStrategy for PathRenormalize {
    fn class(&self) -> StrategyClass {
        StrategyClass::PathRenormalize
    }

    async fn apply(&self, ctx: &RepairContext, _: &CheckGroup, outcome: &GroupOutcome) -> Result<String, GateError> {
        let paths: Vec<PathBuf> = token_details(outcome, "path_unresolved")
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let ws = Arc::clone(&ctx.workspace);
        blocking(move || {
            let mut created = Vec::new();
            for rel in paths {
                if !ws.allowed(&rel) {
                    tracing::debug!(path = %rel.display(), "unresolved path outside allow-list");
                    continue;
                }
                let dir = if rel.extension().is_some() {
                    rel.parent().map(Path::to_path_buf).unwrap_or_default()
                } else {
                    rel
                };
                let abs = ws.anchor(&dir);
                if abs.is_dir() {
                    continue;
                }
                std::fs::create_dir_all(&abs).map_err(|e| GateError::io_error(&abs, e))?;
                created.push(ws.relative(&abs).unwrap_or_default());
            }
            Ok(format!("created {} directories", created.len()))
        })
        .await
    }
}

/// Strategy backed by a configured command
#[derive(Debug, Clone)]
pub struct CommandStrategy {
    name: String,
    family: RepairFamily,
    command: Vec<String>,
}

impl CommandStrategy {
    /// Strategy `name` running `command` for `family`
    #[must_use]
    pub fn new(name: impl Into<String>, family: RepairFamily, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            family,
            command,
        }
    }

    /// Family the command repairs
    #[must_use]
    pub fn family(&self) -> RepairFamily {
        self.family
    }
}

#[async_trait::async_trait]
impl RepairStrategy for CommandStrategy {
    fn class(&self) -> StrategyClass {
        StrategyClass::Command(self.name.clone())
    }

    async fn apply(&self, ctx: &RepairContext, group: &CheckGroup, _: &GroupOutcome) -> Result<String, GateError> {
        let Some((program, rest)) = self.command.split_first() else {
            return Err(GateError::invalid_input(format!("repair command {} is empty", self.name)));
        };
        let Some(resolved) = ctx.workspace.resolve_tool(program) else {
            return Ok(format!("{program} not found on workspace PATH"));
        };
        let root = ctx.workspace.repo_root().to_string_lossy().into_owned();
        let mut args = rest.to_vec();
        args.extend(["--repo-root".to_owned(), root, "--group".to_owned(), group.group_id.clone()]);
        let spec = ProcessSpec {
            program: resolved,
            args,
            env: ctx.workspace.env().clone(),
            cwd: ctx.workspace.repo_root().to_path_buf(),
            timeout: ctx.command_timeout,
            grace: DEFAULT_GRACE,
        };
        let output = run_process(&spec, &ctx.cancel).await?;
        Ok(format!("{} exited {}", self.name, output.returncode()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use xstack_test_utils::TempRepo;
    use xstack_workspace::WorkspaceSpec;

    fn context(repo: &TempRepo) -> RepairContext {
        let spec = WorkspaceSpec::new(repo.path())
            .with_discriminator(Some("repair".into()))
            .with_host_env(BTreeMap::new());
        let ws = Arc::new(Workspace::create(&spec).unwrap());
        let cache = CacheStore::new(ws.repo_root(), ws.id());
        RepairContext::new(ws, cache, "tools/bin")
    }

    fn group(id: &str, tool: &str) -> CheckGroup {
        serde_json::from_value(serde_json::json!({
            "group_id": id,
            "runner_command": [tool],
        }))
        .unwrap()
    }

    fn failing(tokens: &[&str]) -> GroupOutcome {
        GroupOutcome {
            group_id: "repox.x".into(),
            profile: Profile::Fast,
            dep_hash: "abc".into(),
            returncode: 1,
            violations: tokens.iter().map(|t| (*t).to_owned()).collect(),
            refusal_tokens: tokens.iter().map(|t| (*t).to_owned()).collect(),
            cache_hit: false,
            spawned: true,
            timed_out: false,
            cancelled: false,
            seconds: 0.0,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tool_ui_bind_copies_matching_script() {
        let repo = TempRepo::new().file("scripts/gates/lint-check.sh", "#!/bin/sh\nexit 0\n");
        let ctx = context(&repo);
        let outcome = failing(&["refuse.tool_missing.lint-check"]);
        let note = ToolUiBind
            .apply(&ctx, &group("repox.x", "lint-check"), &outcome)
            .await
            .unwrap();
        assert!(note.contains("lint-check"));
        assert!(ctx.workspace().resolve_tool("lint-check").is_some());
    }

    #[tokio::test]
    async fn canonical_rewrite_normalizes_but_skips_drift() {
        let repo = TempRepo::new()
            .file(
                "docs/audit/a.json",
                r#"{"schema_id":"s","artifact_class":"CANONICAL","schema_version":"1.0.0","record":{"b":1,"a":2}}"#,
            )
            .file(
                "docs/audit/drift.json",
                r#"{"artifact_class":"CANONICAL","schema_id":"s","schema_version":"1","record":{"run_id":"x"}}"#,
            );
        let ctx = context(&repo);
        let drift_before = repo.read("docs/audit/drift.json");
        let note = CanonicalRewrite
            .apply(&ctx, &group("g", "t"), &failing(&[]))
            .await
            .unwrap();
        assert_eq!(note, "rewrote 1 canonical artifacts");
        let rewritten = repo.read("docs/audit/a.json");
        assert!(rewritten.starts_with(r#"{"artifact_class":"CANONICAL""#));
        assert!(rewritten.ends_with('\n'));
        assert_eq!(repo.read("docs/audit/drift.json"), drift_before);
    }

    #[tokio::test]
    async fn path_renormalize_stays_inside_allow_list() {
        let repo = TempRepo::new();
        let ctx = context(&repo);
        let outcome = failing(&[
            "refuse.path_unresolved.data/registries/new",
            "refuse.path_unresolved.src/generated",
        ]);
        PathRenormalize
            .apply(&ctx, &group("g", "t"), &outcome)
            .await
            .unwrap();
        assert!(repo.join("data/registries/new").is_dir());
        assert!(!repo.join("src/generated").exists());
    }

    #[tokio::test]
    async fn empty_command_is_invalid() {
        let repo = TempRepo::new();
        let ctx = context(&repo);
        let strategy = CommandStrategy::new("NOOP", RepairFamily::Timeout, Vec::new());
        let err = strategy
            .apply(&ctx, &group("g", "t"), &failing(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidInput(_)));
    }
}
