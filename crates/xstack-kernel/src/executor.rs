//! Layered plan execution
//!
//! Each layer is a fork-join barrier: its groups run on a `JoinSet`, bounded
//! by a semaphore, and the next layer starts only when all of them finished.
//! The tree is snapshotted around every layer so writes outside the
//! allow-list can be reported as workspace escapes.

use crate::error::{KernelError, KernelResult};
use crate::group::GroupRegistry;
use crate::plan::Plan;
use crate::runner::{GroupOutcome, GroupRunner};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use xstack_workspace::{TreeSnapshot, Workspace};

/// Upper bound on concurrent groups
pub const MAX_WORKERS: usize = 16;

/// `min(available cpus, 16)`
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(MAX_WORKERS)
}

/// Executor knobs
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Concurrent groups per layer
    pub max_workers: usize,
    /// Hard timeout for the whole plan
    pub plan_timeout: Option<Duration>,
    /// Snapshot the tree around each layer
    pub detect_escapes: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_workers: default_workers(),
            plan_timeout: None,
            detect_escapes: true,
        }
    }
}

impl ExecutorOptions {
    /// Set the worker bound (at least 1)
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Set the plan timeout
    #[must_use]
    pub fn with_plan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.plan_timeout = timeout;
        self
    }

    /// Enable or disable escape detection
    #[must_use]
    pub fn with_escape_detection(mut self, enabled: bool) -> Self {
        self.detect_escapes = enabled;
        self
    }
}

/// Everything a plan execution produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Outcomes in plan order (layer, then group id)
    pub outcomes: Vec<GroupOutcome>,
    /// Repo-relative paths written outside the allow-list
    pub escaped_paths: Vec<String>,
    /// The run was cancelled (Ctrl-C or plan timeout)
    pub cancelled: bool,
    /// The plan-level timeout fired
    pub plan_timed_out: bool,
    /// Wall time
    pub seconds: f64,
}

impl ExecutionReport {
    /// Groups served from the cache
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.cache_hit).count()
    }

    /// Groups not served from the cache
    #[must_use]
    pub fn cache_misses(&self) -> usize {
        self.outcomes.len() - self.cache_hits()
    }

    /// Outcomes with a non-zero return code
    pub fn failures(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    /// Outcome of `group_id`
    #[must_use]
    pub fn outcome(&self, group_id: &str) -> Option<&GroupOutcome> {
        self.outcomes.iter().find(|o| o.group_id == group_id)
    }
}

async fn snapshot(ws: &Arc<Workspace>) -> KernelResult<TreeSnapshot> {
    let ws = Arc::clone(ws);
    let snap = tokio::task::spawn_blocking(move || TreeSnapshot::capture(&ws))
        .await
        .map_err(|e| KernelError::Task(e.to_string()))??;
    Ok(snap)
}

/// Runs plans layer by layer
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    runner: Arc<GroupRunner>,
    registry: Arc<GroupRegistry>,
    options: ExecutorOptions,
}

impl PlanExecutor {
    /// Executor over `runner` and the groups in `registry`
    #[must_use]
    pub fn new(runner: Arc<GroupRunner>, registry: Arc<GroupRegistry>, options: ExecutorOptions) -> Self {
        Self {
            runner,
            registry,
            options,
        }
    }

    /// Runner used for every group
    #[must_use]
    pub fn runner(&self) -> &Arc<GroupRunner> {
        &self.runner
    }

    /// Execute `plan`
    ///
    /// Once `cancel` fires (or the plan timeout elapses) running children
    /// are drained and no further layer is started.
    ///
    /// # Errors
    /// Snapshot, cache or spawn failures; a failing group is not an error
    pub async fn execute(&self, plan: &Plan, cancel: &CancellationToken) -> KernelResult<ExecutionReport> {
        let started = Instant::now();
        let run_token = cancel.child_token();
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog = self.options.plan_timeout.map(|limit| {
            let token = run_token.clone();
            let flag = Arc::clone(&timed_out);
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(limit) => {
                        tracing::warn!(seconds = limit.as_secs(), "plan timeout reached, cancelling");
                        flag.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                    () = token.cancelled() => {}
                }
            })
        });

        let result = self.run_layers(plan, &run_token).await;
        if let Some(handle) = watchdog {
            handle.abort();
        }
        let (outcomes, escaped_paths) = result?;

        let report = ExecutionReport {
            outcomes,
            escaped_paths,
            cancelled: run_token.is_cancelled(),
            plan_timed_out: timed_out.load(Ordering::SeqCst),
            seconds: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            groups = report.outcomes.len(),
            cache_hits = report.cache_hits(),
            failures = report.failures().count(),
            cancelled = report.cancelled,
            "plan executed"
        );
        Ok(report)
    }

    async fn run_layers(
        &self,
        plan: &Plan,
        token: &CancellationToken,
    ) -> KernelResult<(Vec<GroupOutcome>, Vec<String>)> {
        let ws = self.runner.workspace();
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let mut outcomes = Vec::with_capacity(plan.len());
        let mut escaped = Vec::new();

        for (index, layer) in plan.layers().into_iter().enumerate() {
            if token.is_cancelled() {
                tracing::info!(layer = index, "run cancelled, skipping remaining layers");
                break;
            }
            tracing::debug!(layer = index, groups = layer.len(), "layer start");
            let before = if self.options.detect_escapes {
                Some(snapshot(ws).await?)
            } else {
                None
            };

            let mut set = JoinSet::new();
            for node in layer {
                let group = self
                    .registry
                    .get(&node.group_id)
                    .cloned()
                    .ok_or_else(|| KernelError::UnknownGate(node.group_id.clone()))?;
                let runner = Arc::clone(&self.runner);
                let semaphore = Arc::clone(&semaphore);
                let token = token.clone();
                set.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| KernelError::Task(e.to_string()))?;
                    runner.run(&group, &token).await
                });
            }

            let mut layer_outcomes = Vec::new();
            while let Some(joined) = set.join_next().await {
                let outcome = joined.map_err(|e| KernelError::Task(e.to_string()))??;
                layer_outcomes.push(outcome);
            }
            layer_outcomes.sort_by(|a, b| a.group_id.cmp(&b.group_id));
            outcomes.extend(layer_outcomes);

            if let Some(before) = before {
                let after = snapshot(ws).await?;
                let changed = before.changed_paths(&after);
                if !changed.is_empty() {
                    tracing::warn!(layer = index, paths = changed.len(), "writes outside the workspace allow-list");
                }
                escaped.extend(changed);
            }
            tracing::debug!(layer = index, "layer finished");
        }

        escaped.sort();
        escaped.dedup();
        Ok((outcomes, escaped))
    }
}
