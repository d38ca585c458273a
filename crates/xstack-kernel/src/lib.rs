//! xstack execution kernel
//!
//! Loads check groups, composes a layered plan per profile and runs it:
//! every group is hashed, probed in the cache and otherwise spawned inside
//! the workspace with a soft timeout.
//!
//! # Core Concepts
//!
//! - [`GroupRegistry`] / [`CheckGroup`]: `data/registries/gate_groups.json`
//! - [`compose_plan`]: petgraph layering, `only_gate` closure, `plan_hash`
//! - [`GroupRunner`]: cache probe, tool resolution, child spawn
//! - [`PlanExecutor`]: per-layer fork-join with a worker bound and escape detection
//! - [`refusal_tokens`]: the only control tokens read from child output

mod error;
mod executor;
mod group;
mod plan;
mod process;
mod profile;
mod runner;
mod tokens;

pub use error::{KernelError, KernelResult};
pub use executor::{default_workers, ExecutionReport, ExecutorOptions, PlanExecutor, MAX_WORKERS};
pub use group::{dep_hash, CheckGroup, GroupRegistry, DEFAULT_GROUPS_FILE, DEFINITION_KEY, DRIVER_OUTPUT_FILES};
pub use plan::{compose_plan, Plan, PlanNode, PlanRequest, TESTX_SUITE};
pub use process::{
    run_process, ExitKind, ProcessOutput, ProcessSpec, CANCELLED_RETURNCODE, TIMEOUT_RETURNCODE,
    TOOL_MISSING_RETURNCODE,
};
pub use profile::Profile;
pub use runner::{
    GroupOutcome, GroupRunner, RunnerOptions, DEFAULT_GRACE, DEFAULT_GROUP_TIMEOUT,
    GROUP_RESULT_SCHEMA_ID, GROUP_RESULT_SCHEMA_VERSION,
};
pub use tokens::{refusal, refusal_tokens, refusal_tokens_in, split_refusal, REFUSE_PREFIX};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
