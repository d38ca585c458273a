//! Audit errors

use std::path::PathBuf;
use xstack_canon::CanonError;

/// Errors while loading or persisting findings reports
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Envelope or canonical encoding failure
    #[error(transparent)]
    Canon(#[from] CanonError),

    /// Report could not be read
    #[error("io error at {path}: {source}")]
    Io {
        /// Report path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Report record does not hold findings
    #[error("findings decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Artifact carries a different schema
    #[error("unexpected schema {found}, expected {expected}")]
    SchemaMismatch {
        /// Schema id required
        expected: String,
        /// Schema id present
        found: String,
    },
}

/// Result alias for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
