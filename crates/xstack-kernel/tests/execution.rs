//! Plans executed against fixture repositories with shell-script tools

#![cfg(unix)]

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use xstack_cache::CacheStore;
use xstack_kernel::{
    compose_plan, ExecutionReport, ExecutorOptions, GroupRegistry, GroupRunner, PlanExecutor,
    PlanRequest, Profile, RunnerOptions, TOOL_MISSING_RETURNCODE,
};
use xstack_test_utils::{TempRepo, GROUPS_FILE};
use xstack_workspace::{Workspace, WorkspaceSpec, DEFAULT_TOOLS_SOURCE};

fn workspace(repo: &TempRepo, host_path: bool) -> Arc<Workspace> {
    let mut env = BTreeMap::new();
    if host_path {
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
    }
    let spec = WorkspaceSpec::new(repo.path())
        .with_discriminator(Some("kernel-test".into()))
        .with_host_env(env);
    let ws = Workspace::create(&spec).unwrap();
    ws.provision_tools(Path::new(DEFAULT_TOOLS_SOURCE)).unwrap();
    Arc::new(ws)
}

async fn execute(repo: &TempRepo, ws: &Arc<Workspace>, options: RunnerOptions) -> ExecutionReport {
    let registry = Arc::new(GroupRegistry::load(repo.path(), GROUPS_FILE).unwrap());
    let plan = compose_plan(&registry, &PlanRequest::new(options.profile)).unwrap();
    let cache = CacheStore::new(ws.repo_root(), ws.id());
    let runner = Arc::new(GroupRunner::new(Arc::clone(ws), cache, options));
    PlanExecutor::new(runner, registry, ExecutorOptions::default().with_max_workers(4))
        .execute(&plan, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn warm_cache_skips_the_child() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("structure.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("structure-check", &counter, 0, "")
        .group("repox.structure", &["structure-check"], &["src"]);
    // Empty host PATH: only provisioned workspace tools resolve.
    let ws = workspace(&repo, false);

    let cold = execute(&repo, &ws, RunnerOptions::new(Profile::Fast)).await;
    assert_eq!(cold.cache_misses(), 1);
    assert!(cold.outcomes[0].passed());
    assert_eq!(TempRepo::count_lines(&counter), 1);

    let warm = execute(&repo, &ws, RunnerOptions::new(Profile::Fast)).await;
    assert_eq!(warm.cache_hits(), 1);
    assert!(!warm.outcomes[0].spawned);
    assert_eq!(warm.outcomes[0].dep_hash, cold.outcomes[0].dep_hash);
    assert_eq!(TempRepo::count_lines(&counter), 1);

    repo.write("src/a.c", "int a; int b;\n");
    let edited = execute(&repo, &ws, RunnerOptions::new(Profile::Fast)).await;
    assert_eq!(edited.cache_misses(), 1);
    assert_eq!(TempRepo::count_lines(&counter), 2);
}

#[tokio::test]
async fn strict_runs_cold_and_disabled_cache_never_hits() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("c.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("structure-check", &counter, 0, "")
        .group("repox.structure", &["structure-check"], &["src"]);
    let ws = workspace(&repo, false);

    execute(&repo, &ws, RunnerOptions::new(Profile::Strict)).await;
    let strict = execute(&repo, &ws, RunnerOptions::new(Profile::Strict)).await;
    assert_eq!(strict.cache_hits(), 0);

    let unchanged = RunnerOptions::new(Profile::Strict).with_changed_files(Some(vec!["docs/x.md".into()]));
    let reused = execute(&repo, &ws, unchanged).await;
    assert_eq!(reused.cache_hits(), 1);

    let off = RunnerOptions::new(Profile::Fast).with_cache(false);
    let uncached = execute(&repo, &ws, off).await;
    assert_eq!(uncached.cache_hits(), 0);
    assert_eq!(TempRepo::count_lines(&counter), 3);
}

#[tokio::test]
async fn deterministic_failure_is_cached_with_its_violations() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("schema.count");
    let repo = TempRepo::new()
        .file("schema/a.schema.json", "{}\n")
        .counting_tool("schema-check", &counter, 1, "INV-SCHEMA-01 broken\nsee refuse.schema_load.a")
        .group("schemax.load", &["schema-check"], &["schema"]);
    let ws = workspace(&repo, false);

    let first = execute(&repo, &ws, RunnerOptions::new(Profile::Fast)).await;
    let outcome = first.outcome("schemax.load").unwrap();
    assert_eq!(outcome.returncode, 1);
    assert_eq!(outcome.refusal_tokens, vec!["INV-SCHEMA-01", "refuse.schema_load.a"]);

    let second = execute(&repo, &ws, RunnerOptions::new(Profile::Fast)).await;
    let cached = second.outcome("schemax.load").unwrap();
    assert!(cached.cache_hit);
    assert_eq!(cached.violations, outcome.violations);
    assert_eq!(TempRepo::count_lines(&counter), 1);
}

#[tokio::test]
async fn missing_tool_is_a_mechanical_refusal() {
    let repo = TempRepo::new().group("repox.ghost", &["ghost-check"], &[]);
    let ws = workspace(&repo, false);
    let report = execute(&repo, &ws, RunnerOptions::new(Profile::Strict)).await;
    let outcome = report.outcome("repox.ghost").unwrap();
    assert_eq!(outcome.returncode, TOOL_MISSING_RETURNCODE);
    assert_eq!(outcome.refusal_tokens, vec!["refuse.tool_missing.ghost-check"]);
    assert!(!outcome.spawned);
}

#[tokio::test]
async fn timeout_kills_and_is_not_cached() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("slow.count");
    let repo = TempRepo::new()
        .tool("slow-check", &format!("echo run >> '{}'\nsleep 30", counter.display()))
        .group_value(json!({
            "group_id": "testx.slow",
            "runner_command": ["slow-check"],
            "timeout_secs": 1
        }));
    let ws = workspace(&repo, true);
    let options = RunnerOptions::new(Profile::Fast).with_grace(Duration::from_millis(200));

    let report = execute(&repo, &ws, options.clone()).await;
    let outcome = report.outcome("testx.slow").unwrap();
    assert!(outcome.timed_out);
    assert!(outcome.refusal_tokens.contains(&"refuse.timeout.testx.slow".to_string()));

    let again = execute(&repo, &ws, options).await;
    assert!(!again.outcome("testx.slow").unwrap().cache_hit);
    assert_eq!(TempRepo::count_lines(&counter), 2);
}

#[tokio::test]
async fn writes_outside_the_allow_list_are_reported() {
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .tool(
            "leaky-check",
            "echo x > \"$DOM_REPO_ROOT/src/leak.txt\"\necho y > \"$DOM_REPO_ROOT/docs/ok.txt\"",
        )
        .group("repox.leaky", &["leaky-check"], &[]);
    let ws = workspace(&repo, false);
    let report = execute(&repo, &ws, RunnerOptions::new(Profile::Strict)).await;
    assert_eq!(report.escaped_paths, vec!["src/leak.txt".to_string()]);
}

#[tokio::test]
async fn layers_run_in_dependency_order() {
    let counters = tempfile::tempdir().unwrap();
    let order = counters.path().join("order.log");
    let repo = TempRepo::new()
        .tool("first-check", &format!("echo first >> '{}'", order.display()))
        .tool("second-check", &format!("echo second >> '{}'", order.display()))
        .group_value(json!({
            "group_id": "repox.second",
            "runner_command": ["second-check"],
            "deps": ["repox.first"]
        }))
        .group_value(json!({
            "group_id": "repox.first",
            "runner_command": ["first-check"]
        }));
    let ws = workspace(&repo, false);
    let report = execute(&repo, &ws, RunnerOptions::new(Profile::Strict)).await;
    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.group_id.as_str()).collect();
    assert_eq!(ids, vec!["repox.first", "repox.second"]);
    assert_eq!(std::fs::read_to_string(&order).unwrap(), "first\nsecond\n");
}

#[tokio::test]
async fn cancelled_run_starts_nothing() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("c.count");
    let repo = TempRepo::new()
        .counting_tool("structure-check", &counter, 0, "")
        .group("repox.structure", &["structure-check"], &[]);
    let ws = workspace(&repo, false);
    let registry = Arc::new(GroupRegistry::load(repo.path(), GROUPS_FILE).unwrap());
    let plan = compose_plan(&registry, &PlanRequest::new(Profile::Strict)).unwrap();
    let runner = Arc::new(GroupRunner::new(
        Arc::clone(&ws),
        CacheStore::new(ws.repo_root(), ws.id()),
        RunnerOptions::new(Profile::Strict),
    ));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = PlanExecutor::new(runner, registry, ExecutorOptions::default())
        .execute(&plan, &cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert!(report.outcomes.is_empty());
    assert_eq!(TempRepo::count_lines(&counter), 0);
}

#[tokio::test]
async fn plan_timeout_cancels_remaining_work() {
    let repo = TempRepo::new()
        .tool("slow-check", "sleep 30")
        .group("repox.slow", &["slow-check"], &[]);
    let ws = workspace(&repo, true);
    let registry = Arc::new(GroupRegistry::load(repo.path(), GROUPS_FILE).unwrap());
    let plan = compose_plan(&registry, &PlanRequest::new(Profile::Strict)).unwrap();
    let runner = Arc::new(GroupRunner::new(
        Arc::clone(&ws),
        CacheStore::new(ws.repo_root(), ws.id()),
        RunnerOptions::new(Profile::Strict).with_grace(Duration::from_millis(200)),
    ));
    let options = ExecutorOptions::default().with_plan_timeout(Some(Duration::from_millis(300)));
    let report = PlanExecutor::new(runner, registry, options)
        .execute(&plan, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.plan_timed_out);
    assert!(report.cancelled);
    assert!(report.outcome("repox.slow").unwrap().cancelled);
}
