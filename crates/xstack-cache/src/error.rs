//! Cache errors

use std::path::PathBuf;
use xstack_canon::CanonError;

/// Errors during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Domain or key contains characters outside `[a-z0-9._-]`
    #[error("invalid cache {kind}: '{value}'")]
    InvalidKey {
        /// `domain` or `key`
        kind: &'static str,
        /// Offending value
        value: String,
    },

    /// Artifact violates its canonical contract
    #[error("canonical contract: {0}")]
    Canon(#[from] CanonError),

    /// Disk failure
    #[error("io error at {path}: {source}")]
    Io {
        /// Entry path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Blocking task failed to complete
    #[error("cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
