//! Tool provisioning into the workspace tools prefix

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::workspace::{is_executable, Workspace};
use std::path::Path;

/// Default repo-relative tool source directory
pub const DEFAULT_TOOLS_SOURCE: &str = "tools/bin";

impl Workspace {
    /// Copy every executable file from `source` into the tools dir
    ///
    /// `source` is anchored at the repo root. A missing source directory
    /// provisions nothing. Files already present with identical content are
    /// left alone. Returns the number of tools available from `source`.
    ///
    /// # Errors
    /// IO failures while reading the source or copying
    pub fn provision_tools(&self, source: &Path) -> WorkspaceResult<usize> {
        let source = self.anchor(source);
        if !source.is_dir() {
            tracing::debug!(source = %source.display(), "no tool source directory");
            return Ok(0);
        }

        let mut entries: Vec<_> = std::fs::read_dir(&source)
            .map_err(|e| WorkspaceError::io_error(&source, e))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_executable(path))
            .collect();
        entries.sort();

        let tools_dir = &self.dirs().tools_dir;
        std::fs::create_dir_all(tools_dir).map_err(|e| WorkspaceError::io_error(tools_dir, e))?;

        for src in &entries {
            let Some(name) = src.file_name() else { continue };
            let dest = tools_dir.join(name);
            if same_content(src, &dest) {
                continue;
            }
            std::fs::copy(src, &dest).map_err(|e| WorkspaceError::io_error(&dest, e))?;
        }

        tracing::debug!(count = entries.len(), ws_id = %self.id(), "tools provisioned");
        Ok(entries.len())
    }
}

fn same_content(a: &Path, b: &Path) -> bool {
    match (std::fs::read(a), std::fs::read(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
