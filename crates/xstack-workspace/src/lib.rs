//! xstack workspace isolation
//!
//! Derives a deterministic [`WorkspaceId`] per run and the isolated directory
//! triple it owns (`build_root`, `verify_root`, `dist_root`, plus a tools
//! prefix). The [`Workspace`] also carries the child environment and the
//! mutation allow-list that gate children must respect.
//!
//! # Example
//!
//! ```rust,ignore
//! use xstack_workspace::{Workspace, WorkspaceSpec};
//!
//! let ws = Workspace::create(&WorkspaceSpec::new("/repo").with_process_env())?;
//! ws.provision_tools("tools/bin".as_ref())?;
//! assert!(ws.allowed("docs/audit/FINDINGS.json".as_ref()));
//! ```

mod error;
mod id;
mod snapshot;
mod tools;
mod workspace;

pub use error::{WorkspaceError, WorkspaceResult};
pub use id::{sanitize, WorkspaceId, DEFAULT_SEED, MAX_ID_LEN};
pub use snapshot::{FileStamp, TreeSnapshot, SNAPSHOT_SKIP};
pub use tools::DEFAULT_TOOLS_SOURCE;
pub use workspace::{
    is_executable, normalize_lexically, process_env, Workspace, WorkspaceDirs, WorkspaceSpec,
    ALLOWED_ROOTS, STRIPPED_ENV,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
