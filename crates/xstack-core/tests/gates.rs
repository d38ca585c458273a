//! Full gate runs against fixture repositories with shell-script tools

#![cfg(unix)]

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use xstack_cache::CACHE_DIR;
use xstack_canon::CanonicalArtifact;
use xstack_core::remediation::{ToolDiscovery, ToolUiBind};
use xstack_core::{
    EntryPoint, GateConfig, GateDriver, GateError, GateReport, GateRequest, RefusalCode, RepairFamily,
    StrategyRegistry, FINDINGS_FILE, IDENTITY_MANIFEST_FILE,
};
use xstack_test_utils::TempRepo;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
}

fn request(repo: &TempRepo, entry: EntryPoint, ws: &str) -> GateRequest {
    // Empty host environment: PATH holds the workspace tools dir only.
    GateRequest::new(repo.path(), entry)
        .with_workspace_id(ws)
        .with_today(today())
}

async fn run(driver: &GateDriver, request: &GateRequest) -> GateReport {
    driver.run(request, &CancellationToken::new()).await
}

fn runlog(report: &GateReport) -> Value {
    let path = report.runlog_path.as_ref().expect("runlog written");
    let bytes = std::fs::read(path).unwrap();
    let doc: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(doc["artifact_class"], "DERIVED_VIEW");
    doc["record"].clone()
}

/// Tool whose n-th invocation prints `outputs[n-1]` and exits 1; once the
/// outputs run out it exits 0. Uses shell builtins only.
fn sequenced_tool(repo: TempRepo, name: &str, counter: &Path, outputs: &[&str]) -> TempRepo {
    let mut body = format!(
        "echo run >> '{c}'\nn=0\nwhile read -r _; do n=$((n+1)); done < '{c}'\ncase \"$n\" in\n",
        c = counter.display()
    );
    for (i, output) in outputs.iter().enumerate() {
        body.push_str(&format!("  {}) echo '{output}'; exit 1;;\n", i + 1));
    }
    body.push_str("  *) exit 0;;\nesac");
    repo.tool(name, &body)
}

#[tokio::test]
async fn empty_path_verify_runs_provisioned_tools() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("lint.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("lint-check", &counter, 0, "clean")
        .group("repox.lint", &["lint-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "empty-path")).await;

    assert_eq!(report.returncode(), 0, "{}", report.summary());
    assert!(report.summary().starts_with("xstack verify: PASS rc=0 profile=STRICT"));
    assert_eq!(TempRepo::count_lines(&counter), 1);

    let record = runlog(&report);
    assert_eq!(record["steps"][0]["group_id"], "repox.lint");
    assert_eq!(record["steps"][0]["status"], "passed");
    assert_eq!(record["returncode"], 0);
    let path = report.runlog_path.unwrap();
    assert!(path.starts_with(repo.join("docs/audit/remediation")));
}

#[tokio::test]
async fn drift_reported_by_a_group_is_refused_without_repair() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("drift.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("canon-check", &counter, 1, "REFUSE_CANONICAL_DRIFT docs/audit/x.json")
        .group("repox.canon", &["canon-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "drift")).await;

    assert_eq!(report.returncode(), 2);
    assert!(report.refusal_tokens.contains(&"REFUSE_CANONICAL_DRIFT".to_owned()));
    assert_eq!(TempRepo::count_lines(&counter), 1);

    let record = runlog(&report);
    assert_eq!(record["primary_failure_class"], "CANONICAL_DRIFT");
    assert_eq!(record["steps"][0]["status"], "failed");
    assert_eq!(record["steps"][0]["remediation"], Value::Null);
}

#[tokio::test]
async fn exitcheck_refuses_canonical_documents_with_run_metadata() {
    let counters = tempfile::tempdir().unwrap();
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .file(
            "docs/audit/stale.json",
            r#"{"artifact_class":"CANONICAL","schema_id":"dom.stale","schema_version":"1.0.0","record":{"created_utc":"2026-01-01T00:00:00Z","value":1}}"#,
        )
        .counting_tool("lint-check", &counters.path().join("c"), 0, "")
        .group("repox.lint", &["lint-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Exitcheck, "deep-drift")).await;

    assert_eq!(report.returncode(), 2);
    let drift: Vec<_> = report
        .refusals
        .iter()
        .filter(|r| r.code == RefusalCode::CanonicalDrift)
        .collect();
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].details["paths"], json!(["docs/audit/stale.json"]));

    // The snapshot itself is still written, and is clean.
    let findings = repo.read_json(FINDINGS_FILE);
    assert_eq!(findings["artifact_class"], "CANONICAL");
    assert!(findings["record"].get("created_utc").is_none());
    assert!(repo.join(IDENTITY_MANIFEST_FILE).is_file());
}

#[tokio::test]
async fn snapshot_mode_writes_findings_and_identity() {
    let counters = tempfile::tempdir().unwrap();
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("lint-check", &counters.path().join("c"), 0, "")
        .group("repox.lint", &["lint-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let plain = run(&driver, &request(&repo, EntryPoint::Precheck, "snap")).await;
    assert_eq!(plain.returncode(), 0);
    assert!(!repo.join(FINDINGS_FILE).exists());

    let snap = run(&driver, &request(&repo, EntryPoint::Precheck, "snap").with_snapshot(true)).await;
    assert_eq!(snap.returncode(), 0, "{}", snap.summary());
    assert!(repo.join(FINDINGS_FILE).is_file());
    let identity = repo.read_json(IDENTITY_MANIFEST_FILE);
    assert_eq!(identity["artifact_class"], "CANONICAL");

    let record = runlog(&snap);
    assert!(record["identity_fingerprint"].is_string());
    assert!(record["findings"]["total"].is_number());
}

#[tokio::test]
async fn warm_precheck_reuses_the_cached_result() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("structure.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("structure-check", &counter, 0, "")
        .group("repox.structure", &["structure-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let cold = run(&driver, &request(&repo, EntryPoint::Precheck, "warm")).await;
    assert_eq!(cold.returncode(), 0);
    assert_eq!(cold.result.cache_misses, 1);

    let warm = run(&driver, &request(&repo, EntryPoint::Precheck, "warm")).await;
    assert_eq!(warm.returncode(), 0);
    assert_eq!(warm.result.cache_hits, 1);
    assert!(warm.summary().contains("cache_hits=1"));
    assert_eq!(TempRepo::count_lines(&counter), 1);
    assert_eq!(runlog(&warm)["steps"][0]["cache_hit"], true);

    // Same tree, cache switched off: the tool runs again.
    let off = run(&driver, &request(&repo, EntryPoint::Precheck, "warm").with_cache(false)).await;
    assert_eq!(off.result.cache_hits, 0);
    assert_eq!(TempRepo::count_lines(&counter), 2);
}

#[tokio::test]
async fn docs_rooted_group_stays_warm_across_audit_writes() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("docs.count");
    let repo = TempRepo::new()
        .file("docs/architecture/CANON.md", "# Canon\n")
        .counting_tool("docs-check", &counter, 0, "")
        .group("repox.docs", &["docs-check"], &["docs"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    // Snapshot runs write runlogs, findings and the identity manifest under docs/.
    let cold = run(&driver, &request(&repo, EntryPoint::Precheck, "docs").with_snapshot(true)).await;
    assert_eq!(cold.returncode(), 0, "{}", cold.summary());
    assert_eq!(cold.result.cache_misses, 1);
    assert!(repo.join(FINDINGS_FILE).is_file());
    assert!(repo.join(IDENTITY_MANIFEST_FILE).is_file());

    let warm = run(&driver, &request(&repo, EntryPoint::Precheck, "docs").with_snapshot(true)).await;
    assert_eq!(warm.result.cache_hits, 1, "{}", warm.summary());
    assert_eq!(warm.result.cache_misses, 0);

    let plain = run(&driver, &request(&repo, EntryPoint::Precheck, "docs")).await;
    assert_eq!(plain.result.cache_hits, 1, "{}", plain.summary());
    assert_eq!(TempRepo::count_lines(&counter), 1);

    // A real docs edit still invalidates.
    repo.write("docs/architecture/CANON.md", "# Canon\n\nAmended.\n");
    let edited = run(&driver, &request(&repo, EntryPoint::Precheck, "docs")).await;
    assert_eq!(edited.result.cache_misses, 1);
    assert_eq!(TempRepo::count_lines(&counter), 2);
}

#[tokio::test]
async fn exitcheck_twice_reproduces_finding_ids() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("policy.count");
    let earlier = r#"{"artifact_class":"DERIVED_VIEW","schema_id":"xstack.remediation.runlog","schema_version":"1.0.0","record":{"refusal_tokens":["refuse.ambiguous_policy.naming"],"steps":[]},"extensions":{}}"#;
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .file("docs/audit/remediation/old-a/run-1/RUNLOG.json", earlier)
        .file("docs/audit/remediation/old-b/run-1/RUNLOG.json", earlier)
        .file("docs/audit/remediation/old-c/run-1/RUNLOG.json", earlier)
        .counting_tool("policy-check", &counter, 1, "refuse.ambiguous_policy.naming")
        .group("repox.policy", &["policy-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let ids = |repo: &TempRepo| -> Vec<String> {
        let doc = repo.read_json(FINDINGS_FILE);
        doc["record"]["findings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["finding_id"].as_str().unwrap().to_owned())
            .collect()
    };

    // Each run fails the same way and leaves one more runlog behind.
    let first = run(&driver, &request(&repo, EntryPoint::Exitcheck, "exit-one")).await;
    assert_eq!(first.blockers.len(), 1, "{}", first.summary());
    let before = ids(&repo);
    let recurring = repo.read_json(FINDINGS_FILE)["record"]["findings"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|f| f["analyzer_id"] == "blocker_recurrence")
        .count();
    assert_eq!(recurring, 1);

    let second = run(&driver, &request(&repo, EntryPoint::Exitcheck, "exit-two")).await;
    assert_eq!(second.blockers.len(), 1, "{}", second.summary());
    assert_eq!(ids(&repo), before);
    assert_eq!(runlog(&second)["findings"]["added"], 0);
    assert_eq!(runlog(&second)["findings"]["resolved"], 0);
}

#[tokio::test]
async fn remediation_continues_while_failures_shrink() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("inv.count");
    let repo = sequenced_tool(
        TempRepo::new().file("src/a.c", "int a;\n"),
        "inv-check",
        &counter,
        &["INV-A INV-B INV-C violated", "INV-A INV-B violated"],
    )
    .group("repox.inv", &["inv-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "improve")).await;

    assert_eq!(report.returncode(), 0, "{}", report.summary());
    assert_eq!(TempRepo::count_lines(&counter), 3);

    let step = &runlog(&report)["steps"][0];
    assert_eq!(step["status"], "remediated");
    let attempts = step["remediation"]["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["strategy_class"], "CACHE_INVALIDATE");
    assert_eq!(attempts[0]["score_before"], 3);
    assert_eq!(attempts[0]["score_after"], 2);
    assert_eq!(attempts[0]["progress"], "IMPROVED");
    assert_eq!(attempts[1]["strategy_class"], "CANONICAL_REWRITE");
    assert_eq!(attempts[1]["progress"], "PASSED");
}

#[tokio::test]
async fn remediation_aborts_on_regression() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("inv.count");
    let repo = sequenced_tool(
        TempRepo::new().file("src/a.c", "int a;\n"),
        "inv-check",
        &counter,
        &["INV-A INV-B error error", "INV-A INV-B INV-C", "INV-A"],
    )
    .group("repox.inv", &["inv-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "regress")).await;

    assert_eq!(report.returncode(), 1);
    // One original run plus one rerun; the third output is never reached.
    assert_eq!(TempRepo::count_lines(&counter), 2);

    let step = &runlog(&report)["steps"][0];
    assert_eq!(step["status"], "failed");
    assert_eq!(step["failure_class"], "MECHANICAL");
    let attempts = step["remediation"]["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["progress"], "REGRESSED");
    assert_eq!(step["refusal_tokens"], json!(["INV-A", "INV-B", "INV-C"]));
}

#[tokio::test]
async fn stalled_tool_discovery_stops_the_loop() {
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .file("scripts/scan-tool.sh", "#!/bin/sh\nexit 0\n")
        .group("repox.scan", &["scan-tool"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "stall")).await;

    assert_eq!(report.returncode(), 1);
    assert!(report.refusal_tokens.contains(&"refuse.tool_missing.scan-tool".to_owned()));
    let attempts = runlog(&report)["steps"][0]["remediation"]["attempts"].clone();
    assert_eq!(attempts.as_array().unwrap().len(), 1);
    assert_eq!(attempts[0]["strategy_class"], "TOOL_DISCOVERY");
    assert_eq!(attempts[0]["progress"], "STALLED");
}

#[tokio::test]
async fn tool_binding_resolves_a_missing_tool() {
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .file("scripts/scan-tool.sh", "#!/bin/sh\nexit 0\n")
        .group("repox.scan", &["scan-tool"], &["src"]);
    xstack_test_utils::make_executable(&repo.join("scripts/scan-tool.sh"));

    let mut strategies = StrategyRegistry::new();
    for family in RepairFamily::ALL {
        strategies.register(family, Arc::new(ToolUiBind));
        strategies.register(family, Arc::new(ToolDiscovery));
    }
    strategies.validate().unwrap();
    let driver = GateDriver::with_strategies(GateConfig::default(), strategies);

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "bind")).await;

    assert_eq!(report.returncode(), 0, "{}", report.summary());
    let step = &runlog(&report)["steps"][0];
    assert_eq!(step["status"], "remediated");
    assert_eq!(step["remediation"]["attempts"][0]["strategy_class"], "TOOL_UI_BIND");
}

#[test]
fn every_family_needs_two_strategy_classes() {
    let defaults = StrategyRegistry::with_defaults(&[]).unwrap();
    for family in RepairFamily::ALL {
        assert!(defaults.classes(family).len() >= 2, "{family}");
    }

    let mut thin = StrategyRegistry::new();
    for family in RepairFamily::ALL {
        thin.register(family, Arc::new(ToolDiscovery));
    }
    assert!(matches!(thin.validate(), Err(GateError::StrategyDiversity { count: 1, .. })));
}

#[tokio::test]
async fn semantic_failures_escalate_with_a_blocker() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("policy.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("policy-check", &counter, 1, "refuse.ambiguous_policy.ownership")
        .group("repox.policy", &["policy-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "semantic")).await;

    assert_eq!(report.returncode(), 3);
    assert_eq!(report.blockers.len(), 1);
    assert_eq!(TempRepo::count_lines(&counter), 1);
    let step = &runlog(&report)["steps"][0];
    assert_eq!(step["failure_class"], "SEMANTIC");
    let blocker = step["blocker"].as_str().unwrap();
    assert!(blocker.contains("RECOMMENDED OPTION: CLARIFY_POLICY\n"), "{blocker}");
}

#[tokio::test]
async fn active_override_waives_an_invariant() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("inv.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("inv-check", &counter, 1, "INV-A violated")
        .group("repox.inv", &["inv-check"], &["src"])
        .overrides(json!([
            {"id": "OV-1", "invariant": "INV-A", "reason": "migration", "expires": "2026-12-31"}
        ]));
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "waive")).await;
    assert_eq!(report.returncode(), 0, "{}", report.summary());
    assert_eq!(runlog(&report)["steps"][0]["status"], "waived");
    assert_eq!(TempRepo::count_lines(&counter), 1);

    let expired =
        request(&repo, EntryPoint::Verify, "waive").with_today(NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
    let report = run(&driver, &expired).await;
    assert_eq!(report.returncode(), 1);
}

#[tokio::test]
async fn release_branches_refuse_overrides() {
    let counters = tempfile::tempdir().unwrap();
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("lint-check", &counters.path().join("c"), 0, "")
        .group("repox.lint", &["lint-check"], &["src"])
        .overrides(json!([
            {"id": "OV-1", "invariant": "INV-A", "reason": "migration", "expires": "2026-12-31"}
        ]));
    let driver = GateDriver::new(GateConfig::default()).unwrap();
    let env: BTreeMap<String, String> = [("DOM_RELEASE_BRANCH".to_owned(), "1".to_owned())].into_iter().collect();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "release").with_host_env(env)).await;

    assert_eq!(report.returncode(), 2);
    assert!(report.refusal_tokens.contains(&"REFUSE_OVERRIDE_FORBIDDEN".to_owned()));
    assert!(report.summary().contains("primary=REFUSE_OVERRIDE_FORBIDDEN"));
}

#[tokio::test]
async fn writes_outside_the_allow_list_are_refused() {
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .tool("gen-check", "echo 'int g;' > \"$DOM_REPO_ROOT/src/generated.c\"\nexit 0")
        .group("repox.gen", &["gen-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &request(&repo, EntryPoint::Verify, "escape")).await;

    assert_eq!(report.returncode(), 2);
    assert!(report.refusal_tokens.contains(&"REFUSE_WORKSPACE_ESCAPE".to_owned()));
    assert_eq!(runlog(&report)["escaped_paths"], json!(["src/generated.c"]));
}

#[tokio::test]
async fn cancelled_run_still_writes_its_runlog() {
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .tool("lint-check", "exit 0")
        .group("repox.lint", &["lint-check"], &["src"]);
    let driver = GateDriver::new(GateConfig::default()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = driver
        .run(&request(&repo, EntryPoint::Exitcheck, "cancelled"), &cancel)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.returncode(), 1);
    assert_eq!(runlog(&report)["cancelled"], true);
    assert!(!repo.join(IDENTITY_MANIFEST_FILE).exists());
}

#[tokio::test]
async fn unknown_repo_root_is_refused_without_a_runlog() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let driver = GateDriver::new(GateConfig::default()).unwrap();

    let report = run(&driver, &GateRequest::new(&missing, EntryPoint::Precheck).with_today(today())).await;

    assert_eq!(report.returncode(), 2);
    assert!(report.runlog_path.is_none());
    assert!(report.summary().contains("REFUSED"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_drivers_stay_isolated() {
    let counters = tempfile::tempdir().unwrap();
    let counter = counters.path().join("lint.count");
    let repo = TempRepo::new()
        .file("src/a.c", "int a;\n")
        .counting_tool("lint-check", &counter, 0, "")
        .group("repox.lint", &["lint-check"], &["src"]);
    let driver = Arc::new(GateDriver::new(GateConfig::default()).unwrap());

    let mut set = JoinSet::new();
    for i in 0..10 {
        let driver = Arc::clone(&driver);
        let lane = request(&repo, EntryPoint::Verify, &format!("lane-{i}"));
        set.spawn(async move { driver.run(&lane, &CancellationToken::new()).await });
    }

    let mut runlogs = BTreeSet::new();
    let mut workspaces = BTreeSet::new();
    while let Some(joined) = set.join_next().await {
        let report = joined.unwrap();
        assert_eq!(report.returncode(), 0, "{}", report.summary());
        assert!(report.refusal_tokens.is_empty());
        runlogs.insert(report.runlog_path.unwrap());
        workspaces.insert(report.workspace_id.unwrap());
    }
    assert_eq!(runlogs.len(), 10);
    assert_eq!(workspaces.len(), 10);
    assert_eq!(TempRepo::count_lines(&counter), 10);

    // One dist directory per lane, nothing shared.
    let dist: BTreeSet<String> = std::fs::read_dir(repo.join("dist/ws"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(dist, workspaces);

    // Every cache entry is stored in its canonical encoding.
    for ws in &workspaces {
        assert!(repo.join("dist/ws").join(ws).is_dir());
        let entries: Vec<_> = WalkDir::new(repo.join(CACHE_DIR).join(ws))
            .into_iter()
            .map(Result::unwrap)
            .filter(|e| e.file_type().is_file())
            .collect();
        assert!(!entries.is_empty(), "no cache entries for {ws}");
        for entry in entries {
            let stored = std::fs::read(entry.path()).unwrap();
            let artifact = CanonicalArtifact::from_slice(&stored).unwrap();
            assert_eq!(artifact.to_bytes().unwrap(), stored, "{}", entry.path().display());
        }
    }
}
