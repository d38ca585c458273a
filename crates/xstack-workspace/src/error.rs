//! Workspace errors

use std::path::PathBuf;

/// Errors while deriving or preparing a workspace
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Repository root does not exist or cannot be resolved
    #[error("invalid repo root {path}: {source}")]
    RepoRoot {
        /// Path given by the caller
        path: PathBuf,
        /// Resolution failure
        #[source]
        source: std::io::Error,
    },

    /// Repository root is not a directory
    #[error("repo root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Filesystem failure while creating dirs or provisioning tools
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being touched
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Tree walk failure
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl WorkspaceError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for workspace operations
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
