//! Bounded remediation of mechanical failures
//!
//! Each failing group gets at most `max_retries` attempts. Every attempt
//! applies a strategy class not yet tried for that group, drops the stale
//! cache entry and reruns the group. The loop stops on a pass, a
//! regression or a stall.

mod family;
mod progress;
mod registry;
mod strategies;

pub use family::{RepairFamily, StrategyClass};
pub use progress::{failure_score, has_measurable_progress, outcome_score, Progress};
pub use registry::{StrategyRegistry, MIN_STRATEGY_CLASSES};
pub use strategies::{
    CacheInvalidate, CanonicalRewrite, CommandStrategy, PathRenormalize, RepairContext,
    RepairStrategy, ToolDiscovery, ToolUiBind, WorkspaceRebuild, AUDIT_ROOT, TOOL_SEARCH_ROOTS,
};

use crate::config::{MAX_RETRIES, MIN_RETRIES};
use crate::error::GateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use xstack_cache::{CacheKey, GROUP_DOMAIN};
use xstack_kernel::{CheckGroup, GroupOutcome, GroupRunner};

/// Reruns a group after a repair
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RunGroup: Send + Sync {
    /// Run `group` once
    async fn run_group(&self, group: &CheckGroup, cancel: &CancellationToken) -> Result<GroupOutcome, GateError>;

    /// Forget the cached result `outcome` came from
    async fn invalidate(&self, outcome: &GroupOutcome) -> Result<(), GateError>;
}

#[async_trait::async_trait]
impl RunGroup for GroupRunner {
    async fn run_group(&self, group: &CheckGroup, cancel: &CancellationToken) -> Result<GroupOutcome, GateError> {
        Ok(self.run(group, cancel).await?)
    }

    async fn invalidate(&self, outcome: &GroupOutcome) -> Result<(), GateError> {
        let key = CacheKey::group(&outcome.group_id, outcome.profile.as_str(), &outcome.dep_hash);
        self.cache().discard(GROUP_DOMAIN, key.as_str()).await?;
        Ok(())
    }
}

/// One repair attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAttempt {
    /// 1-based attempt number
    pub attempt: usize,
    /// Class applied
    pub strategy_class: String,
    /// Family being repaired
    pub family: RepairFamily,
    /// Runlog note from the strategy
    pub note: String,
    /// Score before the attempt
    pub score_before: usize,
    /// Score after the rerun
    pub score_after: usize,
    /// Rerun return code
    pub returncode: i32,
    /// Verdict
    pub progress: Progress,
}

/// Remediation history of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRecord {
    /// Group id
    pub group_id: String,
    /// Family of the original failure
    pub family: RepairFamily,
    /// Attempts in order
    pub attempts: Vec<RemediationAttempt>,
    /// Outcome after the last rerun (the original if nothing ran)
    pub final_outcome: GroupOutcome,
}

impl RemediationRecord {
    /// The group passes after remediation
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.final_outcome.passed()
    }

    /// Refusal tokens still present
    #[must_use]
    pub fn remaining_tokens(&self) -> &[String] {
        &self.final_outcome.refusal_tokens
    }

    /// Classes applied, in order
    #[must_use]
    pub fn attempted_classes(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.strategy_class.as_str()).collect()
    }
}

/// The repair loop
#[derive(Debug, Clone)]
pub struct RemediationLoop {
    registry: StrategyRegistry,
    max_retries: usize,
}

impl RemediationLoop {
    /// Loop over `registry` with `max_retries` clamped to `[2, 5]`
    #[must_use]
    pub fn new(registry: StrategyRegistry, max_retries: usize) -> Self {
        Self {
            registry,
            max_retries: max_retries.clamp(MIN_RETRIES, MAX_RETRIES),
        }
    }

    /// Effective retry bound
    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Strategy registry
    #[must_use]
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Repair `group`, which failed with `failed`
    ///
    /// Strategy errors are logged and count as an attempt that changed
    /// nothing; only rerun and cache failures abort.
    ///
    /// # Errors
    /// Rerun or cache invalidation failures
    pub async fn remediate(
        &self,
        ctx: &RepairContext,
        runner: &dyn RunGroup,
        group: &CheckGroup,
        failed: GroupOutcome,
        cancel: &CancellationToken,
    ) -> Result<RemediationRecord, GateError> {
        let family = RepairFamily::of_outcome(&failed);
        let mut tried: BTreeSet<StrategyClass> = BTreeSet::new();
        let mut attempts = Vec::new();
        let mut current = failed;

        for attempt in 1..=self.max_retries {
            if cancel.is_cancelled() {
                break;
            }
            let Some(strategy) = self.registry.next_untried(family, &tried) else {
                tracing::info!(group = %group.group_id, %family, "strategy classes exhausted");
                break;
            };
            let class = strategy.class();
            tried.insert(class.clone());

            let note = match strategy.apply(ctx, group, &current).await {
                Ok(note) => note,
                Err(e) => {
                    tracing::warn!(group = %group.group_id, %class, error = %e, "repair strategy failed");
                    format!("failed: {e}")
                }
            };
            runner.invalidate(&current).await?;
            let after = runner.run_group(group, cancel).await?;

            let score_before = outcome_score(&current);
            let score_after = outcome_score(&after);
            let progress = Progress::assess(after.returncode, score_before, score_after);
            tracing::info!(
                group = %group.group_id,
                attempt,
                %class,
                score_before,
                score_after,
                ?progress,
                "remediation attempt"
            );
            attempts.push(RemediationAttempt {
                attempt,
                strategy_class: class.to_string(),
                family,
                note,
                score_before,
                score_after,
                returncode: after.returncode,
                progress,
            });
            current = after;
            if progress != Progress::Improved || current.cancelled {
                break;
            }
        }

        Ok(RemediationRecord {
            group_id: group.group_id.clone(),
            family,
            attempts,
            final_outcome: current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use xstack_cache::CacheStore;
    use xstack_kernel::Profile;
    use xstack_test_utils::TempRepo;
    use xstack_workspace::{Workspace, WorkspaceSpec};

    use super::strategies::MockRepairStrategy;

    fn context(repo: &TempRepo) -> RepairContext {
        let spec = WorkspaceSpec::new(repo.path())
            .with_discriminator(Some("loop".into()))
            .with_host_env(BTreeMap::new());
        let ws = Arc::new(Workspace::create(&spec).unwrap());
        let cache = CacheStore::new(ws.repo_root(), ws.id());
        RepairContext::new(ws, cache, "tools/bin")
    }

    fn group() -> CheckGroup {
        serde_json::from_value(serde_json::json!({
            "group_id": "repox.structure",
            "runner_command": ["structure-check"],
        }))
        .unwrap()
    }

    fn outcome(returncode: i32, tokens: &[&str]) -> GroupOutcome {
        GroupOutcome {
            group_id: "repox.structure".into(),
            profile: Profile::Strict,
            dep_hash: "h".into(),
            returncode,
            violations: tokens.iter().map(|t| (*t).to_owned()).collect(),
            refusal_tokens: tokens.iter().map(|t| (*t).to_owned()).collect(),
            cache_hit: false,
            spawned: true,
            timed_out: false,
            cancelled: false,
            seconds: 0.0,
        }
    }

    fn strategy(class: StrategyClass, applies: usize) -> Arc<dyn RepairStrategy> {
        let mut mock = MockRepairStrategy::new();
        mock.expect_class().return_const(class);
        mock.expect_apply()
            .times(applies)
            .returning(|_, _, _| Ok("done".to_owned()));
        Arc::new(mock)
    }

    fn registry(strategies: Vec<Arc<dyn RepairStrategy>>) -> StrategyRegistry {
        let mut registry = StrategyRegistry::new();
        for s in strategies {
            registry.register(RepairFamily::GateViolation, s);
        }
        registry
    }

    #[tokio::test]
    async fn improving_attempts_continue_until_pass() {
        let repo = TempRepo::new();
        let ctx = context(&repo);
        let lp = RemediationLoop::new(
            registry(vec![
                strategy(StrategyClass::CacheInvalidate, 1),
                strategy(StrategyClass::CanonicalRewrite, 1),
                strategy(StrategyClass::WorkspaceRebuild, 0),
            ]),
            3,
        );

        let mut runner = MockRunGroup::new();
        let mut seq = Sequence::new();
        runner.expect_invalidate().times(2).returning(|_| Ok(()));
        runner
            .expect_run_group()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(outcome(1, &["INV-B"])));
        runner
            .expect_run_group()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(outcome(0, &[])));

        let record = lp
            .remediate(&ctx, &runner, &group(), outcome(1, &["INV-A", "INV-B"]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(record.resolved());
        assert_eq!(record.attempted_classes(), vec!["CACHE_INVALIDATE", "CANONICAL_REWRITE"]);
        assert_eq!(record.attempts[0].progress, Progress::Improved);
        assert_eq!(record.attempts[1].progress, Progress::Passed);
    }

    #[tokio::test]
    async fn regression_aborts() {
        let repo = TempRepo::new();
        let ctx = context(&repo);
        let lp = RemediationLoop::new(
            registry(vec![
                strategy(StrategyClass::CacheInvalidate, 1),
                strategy(StrategyClass::CanonicalRewrite, 0),
            ]),
            5,
        );
        let mut runner = MockRunGroup::new();
        runner.expect_invalidate().times(1).returning(|_| Ok(()));
        runner
            .expect_run_group()
            .times(1)
            .returning(|_, _| Ok(outcome(1, &["INV-A", "INV-B", "INV-C"])));

        let record = lp
            .remediate(&ctx, &runner, &group(), outcome(1, &["INV-A", "INV-B"]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!record.resolved());
        assert_eq!(record.attempts.len(), 1);
        assert_eq!(record.attempts[0].progress, Progress::Regressed);
    }

    #[tokio::test]
    async fn stall_stops_and_classes_never_repeat() {
        let repo = TempRepo::new();
        let ctx = context(&repo);
        let lp = RemediationLoop::new(
            registry(vec![
                strategy(StrategyClass::CacheInvalidate, 1),
                strategy(StrategyClass::CanonicalRewrite, 0),
            ]),
            5,
        );
        let mut runner = MockRunGroup::new();
        runner.expect_invalidate().times(1).returning(|_| Ok(()));
        runner
            .expect_run_group()
            .times(1)
            .returning(|_, _| Ok(outcome(1, &["INV-A", "INV-B"])));

        let record = lp
            .remediate(&ctx, &runner, &group(), outcome(1, &["INV-A", "INV-B"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.attempts[0].progress, Progress::Stalled);
        assert_eq!(record.remaining_tokens(), ["INV-A", "INV-B"]);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        assert_eq!(RemediationLoop::new(StrategyRegistry::new(), 0).max_retries(), 2);
        assert_eq!(RemediationLoop::new(StrategyRegistry::new(), 9).max_retries(), 5);

        let repo = TempRepo::new();
        let ctx = context(&repo);
        let lp = RemediationLoop::new(
            registry(vec![
                strategy(StrategyClass::CacheInvalidate, 1),
                strategy(StrategyClass::CanonicalRewrite, 1),
                strategy(StrategyClass::WorkspaceRebuild, 0),
            ]),
            2,
        );
        let mut runner = MockRunGroup::new();
        let mut seq = Sequence::new();
        runner.expect_invalidate().times(2).returning(|_| Ok(()));
        runner
            .expect_run_group()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(outcome(1, &["INV-A", "INV-B"])));
        runner
            .expect_run_group()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(outcome(1, &["INV-A"])));

        let record = lp
            .remediate(
                &ctx,
                &runner,
                &group(),
                outcome(1, &["INV-A", "INV-B", "INV-C"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(record.attempts.len(), 2);
        assert!(!record.resolved());
    }
}
