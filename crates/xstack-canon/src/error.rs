//! Error types for the canonical artifact contract

use std::path::PathBuf;

/// Errors raised while validating, encoding or persisting artifacts
#[derive(Debug, thiserror::Error)]
pub enum CanonError {
    /// A CANONICAL artifact carries run-metadata keys
    #[error("canonical drift: forbidden keys present: {}", keys.join(", "))]
    CanonicalDrift {
        /// Dotted paths of every offending key
        keys: Vec<String>,
    },

    /// Document does not have the artifact envelope shape
    #[error("invalid artifact shape: {0}")]
    InvalidShape(String),

    /// JSON decode failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO failure on a specific path
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl CanonError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create shape error
    pub fn invalid_shape(message: impl Into<String>) -> Self {
        Self::InvalidShape(message.into())
    }

    /// True for contract violations (as opposed to IO or decode failures)
    #[must_use]
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::CanonicalDrift { .. })
    }
}

/// Result alias for canonical operations
pub type CanonResult<T> = Result<T, CanonError>;
