//! Kernel errors

use std::path::PathBuf;
use xstack_cache::CacheError;
use xstack_canon::CanonError;
use xstack_workspace::WorkspaceError;

/// Errors from the group registry, planner, runner and executor
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Group registry missing or malformed
    #[error("group registry {path}: {message}")]
    Registry {
        /// Registry file
        path: PathBuf,
        /// What is wrong
        message: String,
    },

    /// A group depends on a group that is not registered
    #[error("group {group} depends on unknown group {dep}")]
    UnknownDependency {
        /// Dependent group
        group: String,
        /// Missing dependency
        dep: String,
    },

    /// `--only-gate` named a group that is not registered
    #[error("unknown gate {0}")]
    UnknownGate(String),

    /// Group dependencies form a cycle
    #[error("dependency cycle through group {0}")]
    Cycle(String),

    /// Child process could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Resolved program path
        program: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Canonical encoding failure
    #[error(transparent)]
    Canon(#[from] CanonError),

    /// Cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Workspace failure
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Blocking task failed to join
    #[error("task failed: {0}")]
    Task(String),
}

impl KernelError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Invalid registry content
    pub fn registry(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Registry {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Errors caused by bad input rather than a failing gate
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::Registry { .. } | Self::UnknownDependency { .. } | Self::UnknownGate(_) | Self::Cycle(_)
        )
    }
}

/// Result alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
