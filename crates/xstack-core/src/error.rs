//! Gate errors and their refusal mapping

use crate::refusal::{Refusal, RefusalCode};
use serde_json::json;
use std::path::PathBuf;
use xstack_audit::AuditError;
use xstack_cache::CacheError;
use xstack_canon::CanonError;
use xstack_graph::GraphError;
use xstack_kernel::KernelError;
use xstack_workspace::WorkspaceError;

/// Errors raised by the gate driver
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Kernel failure (registry, plan, spawn)
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// Canonical contract or encoding failure
    #[error(transparent)]
    Canon(#[from] CanonError),

    /// Cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Graph build or restore failure
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Findings report failure
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Workspace derivation failure
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// `.xstack.toml` could not be parsed
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON encode or decode failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tree walk failure
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Malformed request or input document
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Write target outside the mutation allow-list
    #[error("path outside workspace allow-list: {}", .0.display())]
    PathOutsideWorkspace(PathBuf),

    /// A repair family has fewer than two strategy classes
    #[error("repair family {family} needs at least two strategy classes, has {count}")]
    StrategyDiversity {
        /// Family name
        family: String,
        /// Distinct classes registered
        count: usize,
    },

    /// IO failure on a specific path
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Blocking task failed to complete
    #[error("task failed: {0}")]
    Task(String),
}

impl GateError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Refusal code for this error
    #[must_use]
    pub fn code(&self) -> RefusalCode {
        match self {
            Self::Canon(e) if e.is_drift() => RefusalCode::CanonicalDrift,
            Self::Cache(CacheError::Canon(e)) if e.is_drift() => RefusalCode::CanonicalDrift,
            Self::Kernel(KernelError::Canon(e)) if e.is_drift() => RefusalCode::CanonicalDrift,
            Self::Kernel(e) if e.is_invalid_input() => RefusalCode::InvalidInput,
            Self::PathOutsideWorkspace(_) => RefusalCode::WorkspaceEscape,
            Self::InvalidInput(_)
            | Self::Config(_)
            | Self::StrategyDiversity { .. }
            | Self::Canon(CanonError::InvalidShape(_) | CanonError::Json(_))
            | Self::Workspace(WorkspaceError::RepoRoot { .. } | WorkspaceError::NotADirectory(_)) => {
                RefusalCode::InvalidInput
            }
            _ => RefusalCode::MechanicalFailure,
        }
    }

    /// Structured refusal for this error
    #[must_use]
    pub fn refusal(&self) -> Refusal {
        let refusal = Refusal::new(self.code(), self.to_string());
        match self {
            Self::Canon(CanonError::CanonicalDrift { keys }) => {
                refusal.with_details(json!({ "forbidden_keys": keys }))
            }
            Self::PathOutsideWorkspace(path) => {
                refusal.with_details(json!({ "path": path.to_string_lossy() }))
            }
            _ => refusal,
        }
    }
}
