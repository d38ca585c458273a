//! xstack gate driver
//!
//! Runs the `precheck` / `verify` / `exitcheck` gates over a repository and
//! decides what their failures mean:
//!
//! - mechanical failures go through a bounded, strategy-diverse repair loop
//! - semantic failures become a structured blocker for a human
//! - canonical drift, workspace escapes and forbidden overrides are refusals
//!
//! Results land in a DERIVED_VIEW runlog; DEEP and snapshot runs also write
//! the canonical findings snapshot and identity manifest.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//! use xstack_core::{EntryPoint, GateConfig, GateDriver, GateRequest};
//!
//! # async fn example() -> Result<(), xstack_core::GateError> {
//! let driver = GateDriver::new(GateConfig::default())?;
//! let request = GateRequest::new("/repo", EntryPoint::Verify);
//! let report = driver.run(&request, &CancellationToken::new()).await;
//! println!("{}", report.summary());
//! std::process::exit(report.returncode());
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod escalation;
pub mod identity;
pub mod logging;
pub mod overrides;
pub mod refusal;
pub mod remediation;
pub mod result;
pub mod runlog;
pub mod writer;

pub use config::{changed_files, is_truthy, GateConfig, RepairCommand, CONFIG_FILE};
pub use driver::{
    load_graph, EntryPoint, GateContext, GateDriver, GateReport, GateRequest, FINDINGS_FILE,
    FINDINGS_TREND_FILE,
};
pub use error::GateError;
pub use escalation::{classify, route, Blocker, Classification, Escalation, SemanticCause, SemanticOption};
pub use identity::{IdentityEntry, IdentityKind, IdentityManifest, IDENTITY_MANIFEST_FILE};
pub use logging::{init_tracing, LogFormat};
pub use overrides::{OverrideEntry, OverrideLedger, OVERRIDES_FILE};
pub use refusal::{Refusal, RefusalCode, EXIT_MECHANICAL, EXIT_PASS, EXIT_REFUSAL, EXIT_SEMANTIC};
pub use remediation::{
    RemediationLoop, RemediationRecord, RepairFamily, RepairStrategy, StrategyClass,
    StrategyRegistry,
};
pub use result::{FailureClass, GateResult};
pub use runlog::{run_dir, Runlog, RunlogStep, StepStatus, RUNLOG_FILE};
pub use writer::ArtifactWriter;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a blocking closure on the blocking pool
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, GateError>
where
    F: FnOnce() -> Result<T, GateError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GateError::Task(e.to_string()))?
}
