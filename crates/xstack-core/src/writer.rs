//! Guarded artifact writes
//!
//! Every governance document the driver persists goes through
//! [`ArtifactWriter`]: the envelope contract is checked first, then the
//! target is checked against the workspace allow-list, then the bytes are
//! written atomically.

use crate::error::GateError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xstack_canon::{write_atomic, ArtifactClass, CanonicalArtifact};
use xstack_workspace::Workspace;

/// Writes artifacts inside one workspace's allow-list
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    workspace: Arc<Workspace>,
}

impl ArtifactWriter {
    /// Writer bound to `workspace`
    #[must_use]
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    /// Workspace
    #[must_use]
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Write a CANONICAL artifact to `path` (repo-relative or absolute)
    ///
    /// # Errors
    /// - [`GateError::Canon`] with a drift error when run-meta keys are present
    /// - [`GateError::InvalidInput`] for a non-CANONICAL envelope
    /// - [`GateError::PathOutsideWorkspace`] outside the allow-list
    pub fn write_canonical(&self, path: &Path, artifact: &CanonicalArtifact) -> Result<PathBuf, GateError> {
        if artifact.artifact_class != ArtifactClass::Canonical {
            return Err(GateError::invalid_input(format!(
                "{} is {}, expected {}",
                path.display(),
                artifact.artifact_class.as_str(),
                ArtifactClass::Canonical.as_str()
            )));
        }
        self.write(path, artifact)
    }

    /// Decode `value` as an envelope and write it as CANONICAL
    ///
    /// Decoding checks the contract, so forbidden keys surface as drift
    /// before anything touches the disk.
    ///
    /// # Errors
    /// As [`Self::write_canonical`], plus shape errors
    pub fn write_canonical_value(&self, path: &Path, value: Value) -> Result<PathBuf, GateError> {
        let artifact = CanonicalArtifact::from_value(value)?;
        self.write_canonical(path, &artifact)
    }

    /// Write a DERIVED_VIEW or RUN_META artifact
    ///
    /// # Errors
    /// [`GateError::PathOutsideWorkspace`] outside the allow-list, IO failures
    pub fn write_derived_view(&self, path: &Path, artifact: &CanonicalArtifact) -> Result<PathBuf, GateError> {
        self.write(path, artifact)
    }

    fn write(&self, path: &Path, artifact: &CanonicalArtifact) -> Result<PathBuf, GateError> {
        let bytes = artifact.to_bytes()?;
        if !self.workspace.allowed(path) {
            tracing::warn!(path = %path.display(), "write outside allow-list refused");
            return Err(GateError::PathOutsideWorkspace(path.to_path_buf()));
        }
        let target = self.workspace.anchor(path);
        write_atomic(&target, &bytes)?;
        tracing::debug!(
            path = %target.display(),
            class = artifact.artifact_class.as_str(),
            "artifact written"
        );
        Ok(target)
    }
}
