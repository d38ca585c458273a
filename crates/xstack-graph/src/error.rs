//! Graph errors

use std::path::PathBuf;

/// Errors while building, restoring or validating a graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Walk failure
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// File read failure
    #[error("io error at {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Walk aborted by the cancellation token
    #[error("graph build cancelled")]
    Cancelled,

    /// An edge points at a node that does not exist
    #[error("dangling edge {src} -> {dst}")]
    DanglingEdge {
        /// Source node id
        src: String,
        /// Destination node id
        dst: String,
    },

    /// Stored graph could not be decoded
    #[error("graph decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GraphError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;
