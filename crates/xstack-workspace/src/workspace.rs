//! Workspace derivation: directory layout, child environment, allow-list
//!
//! A [`Workspace`] is derived once per plan and threaded through every child
//! spawn. Every path it hands out is anchored at the resolved repo root, so
//! the caller's working directory never influences results.

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::id::WorkspaceId;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Host variables that leak host tool locations into children
pub const STRIPPED_ENV: [&str; 2] = ["DOM_TOOLS_PATH", "DOM_HOST_PATH"];

/// Repo-relative top-level directories children may write into
pub const ALLOWED_ROOTS: [&str; 3] = ["docs", "schema", "data"];

/// Isolated directory set owned by one workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceDirs {
    /// `out/build/ws/<id>`
    pub build_root: PathBuf,
    /// `out/verify/ws/<id>`
    pub verify_root: PathBuf,
    /// `dist/ws/<id>`
    pub dist_root: PathBuf,
    /// `out/build/ws/<id>/tools`, first entry of the child `PATH`
    pub tools_dir: PathBuf,
}

impl WorkspaceDirs {
    /// Layout for `id` under `repo_root`
    #[must_use]
    pub fn for_id(repo_root: &Path, id: &WorkspaceId) -> Self {
        let build_root = repo_root.join("out").join("build").join("ws").join(id.as_str());
        Self {
            verify_root: repo_root.join("out").join("verify").join("ws").join(id.as_str()),
            dist_root: repo_root.join("dist").join("ws").join(id.as_str()),
            tools_dir: build_root.join("tools"),
            build_root,
        }
    }

    /// Every owned root, in a fixed order
    #[must_use]
    pub fn roots(&self) -> [&Path; 3] {
        [&self.build_root, &self.verify_root, &self.dist_root]
    }
}

/// Inputs for [`Workspace::create`]
#[derive(Debug, Clone)]
pub struct WorkspaceSpec {
    /// Repository root (resolved against the filesystem)
    pub repo_root: PathBuf,
    /// Seed mixed into derived ids
    pub seed: String,
    /// Explicit id (CLI `--workspace-id` or `DOM_WS_ID`)
    pub discriminator: Option<String>,
    /// Host environment the child env starts from
    pub host_env: BTreeMap<String, String>,
}

impl WorkspaceSpec {
    /// Spec with the default seed and an empty host environment
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            seed: crate::id::DEFAULT_SEED.to_string(),
            discriminator: None,
            host_env: BTreeMap::new(),
        }
    }

    /// Set the seed
    #[must_use]
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = seed.into();
        self
    }

    /// Set an explicit discriminator
    #[must_use]
    pub fn with_discriminator(mut self, discriminator: Option<String>) -> Self {
        self.discriminator = discriminator;
        self
    }

    /// Set the host environment
    #[must_use]
    pub fn with_host_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.host_env = env;
        self
    }

    /// Capture the current process environment (non-UTF-8 entries skipped)
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_host_env(process_env())
    }
}

/// Current process environment as a sorted map
#[must_use]
pub fn process_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// An isolated workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    id: WorkspaceId,
    repo_root: PathBuf,
    dirs: WorkspaceDirs,
    env: BTreeMap<String, String>,
}

impl Workspace {
    /// Derive the workspace and create its directories
    ///
    /// Directory creation is idempotent; an existing workspace is reused.
    ///
    /// # Errors
    /// Fails if the repo root cannot be resolved or directories cannot be created
    pub fn create(spec: &WorkspaceSpec) -> WorkspaceResult<Self> {
        let repo_root = std::fs::canonicalize(&spec.repo_root).map_err(|source| {
            WorkspaceError::RepoRoot {
                path: spec.repo_root.clone(),
                source,
            }
        })?;
        if !repo_root.is_dir() {
            return Err(WorkspaceError::NotADirectory(repo_root));
        }

        let id = WorkspaceId::derive(&repo_root, &spec.seed, spec.discriminator.as_deref());
        let dirs = WorkspaceDirs::for_id(&repo_root, &id);
        for dir in dirs.roots().into_iter().chain([dirs.tools_dir.as_path()]) {
            std::fs::create_dir_all(dir).map_err(|e| WorkspaceError::io_error(dir, e))?;
        }

        let env = build_env(&spec.host_env, &repo_root, &id, &dirs);
        tracing::debug!(ws_id = %id, root = %repo_root.display(), "workspace ready");

        Ok(Self {
            id,
            repo_root,
            dirs,
            env,
        })
    }

    /// Workspace id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    /// Resolved repo root
    #[inline]
    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Owned directories
    #[inline]
    #[must_use]
    pub fn dirs(&self) -> &WorkspaceDirs {
        &self.dirs
    }

    /// Child environment
    #[inline]
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Child `PATH`
    #[must_use]
    pub fn path_var(&self) -> &str {
        self.env.get("PATH").map_or("", String::as_str)
    }

    /// Anchor `path` at the repo root and normalise it lexically
    ///
    /// `..` never climbs above the filesystem root; symlinks are not followed.
    #[must_use]
    pub fn anchor(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        };
        normalize_lexically(&joined)
    }

    /// Repo-relative form of `path` with `/` separators, if inside the repo
    #[must_use]
    pub fn relative(&self, path: &Path) -> Option<String> {
        let anchored = self.anchor(path);
        let rel = anchored.strip_prefix(&self.repo_root).ok()?;
        Some(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }

    /// Mutation allow-list
    ///
    /// True iff the normalised path lies inside `docs/`, `schema/`, `data/`
    /// or one of this workspace's own directories.
    #[must_use]
    pub fn allowed(&self, path: &Path) -> bool {
        let anchored = self.anchor(path);
        if ALLOWED_ROOTS
            .iter()
            .any(|root| anchored.starts_with(self.repo_root.join(root)))
        {
            return true;
        }
        self.dirs.roots().iter().any(|root| anchored.starts_with(root))
    }

    /// Resolve a command name against the workspace `PATH`
    ///
    /// Names containing a separator resolve relative to the repo root. The
    /// driver's own `PATH` is never consulted.
    #[must_use]
    pub fn resolve_tool(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        if name.contains('/') {
            let candidate = self.anchor(Path::new(name));
            return is_executable(&candidate).then_some(candidate);
        }
        std::env::split_paths(&OsString::from(self.path_var()))
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }
}

fn build_env(
    host: &BTreeMap<String, String>,
    repo_root: &Path,
    id: &WorkspaceId,
    dirs: &WorkspaceDirs,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = host
        .iter()
        .filter(|(k, _)| !STRIPPED_ENV.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let display = |p: &Path| p.to_string_lossy().into_owned();
    env.insert("DOM_WS_ID".into(), id.to_string());
    env.insert("DOM_REPO_ROOT".into(), display(repo_root));
    env.insert("DOM_BUILD_ROOT".into(), display(&dirs.build_root));
    env.insert("DOM_VERIFY_ROOT".into(), display(&dirs.verify_root));
    env.insert("DOM_DIST_ROOT".into(), display(&dirs.dist_root));

    let tools = display(&dirs.tools_dir);
    let path = match host.get("PATH").map(String::as_str) {
        Some(original) if !original.is_empty() => format!("{tools}:{original}"),
        _ => tools,
    };
    env.insert("PATH".into(), path);
    env
}

/// Collapse `.` and `..` without touching the filesystem
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True for regular files with an execute bit (any file on non-unix)
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn workspace(root: &Path, ws: Option<&str>, host: &[(&str, &str)]) -> Workspace {
        let spec = WorkspaceSpec::new(root)
            .with_discriminator(ws.map(str::to_string))
            .with_host_env(
                host.iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            );
        Workspace::create(&spec).unwrap()
    }

    #[test]
    fn layout_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(
            dir.path(),
            Some("alpha"),
            &[("PATH", "/usr/bin"), ("DOM_TOOLS_PATH", "/host/tools"), ("HOME", "/h")],
        );
        let root = ws.repo_root().to_path_buf();

        assert_eq!(ws.dirs().build_root, root.join("out/build/ws/alpha"));
        assert_eq!(ws.dirs().verify_root, root.join("out/verify/ws/alpha"));
        assert_eq!(ws.dirs().dist_root, root.join("dist/ws/alpha"));
        assert!(ws.dirs().tools_dir.is_dir());

        let env = ws.env();
        assert!(!env.contains_key("DOM_TOOLS_PATH"));
        assert_eq!(env["HOME"], "/h");
        assert_eq!(env["DOM_WS_ID"], "alpha");
        assert_eq!(
            env["PATH"],
            format!("{}:/usr/bin", ws.dirs().tools_dir.display())
        );
    }

    #[test]
    fn empty_path_yields_tools_dir_only() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Some("b"), &[("PATH", "")]);
        assert_eq!(ws.path_var(), ws.dirs().tools_dir.to_string_lossy());
    }

    #[test]
    fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let a = workspace(dir.path(), Some("same"), &[]);
        let b = workspace(dir.path(), Some("same"), &[]);
        assert_eq!(a.dirs(), b.dirs());
    }

    #[test]
    fn allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Some("w"), &[]);

        assert!(ws.allowed(Path::new("docs/audit/x.json")));
        assert!(ws.allowed(Path::new("schema/a.schema.json")));
        assert!(ws.allowed(Path::new("data/registries/r.json")));
        assert!(ws.allowed(&ws.dirs().dist_root.join("pkg/a.bin")));
        assert!(!ws.allowed(Path::new("src/main.c")));
        assert!(!ws.allowed(Path::new("docs/../src/main.c")));
        assert!(!ws.allowed(Path::new("out/build/ws/other/x")));
        assert!(!ws.allowed(Path::new("/etc/passwd")));
    }

    #[test]
    fn relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Some("w"), &[]);
        assert_eq!(
            ws.relative(Path::new("./docs//a/../b.md")).as_deref(),
            Some("docs/b.md")
        );
        assert_eq!(ws.relative(Path::new("/elsewhere")), None);
    }

    #[test]
    fn resolve_tool_uses_workspace_path_only() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Some("w"), &[("PATH", "")]);
        assert_eq!(ws.resolve_tool("sh"), None);

        let tool = ws.dirs().tools_dir.join("check");
        std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        assert_eq!(ws.resolve_tool("check"), Some(tool));
    }

    #[test]
    fn missing_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let spec = WorkspaceSpec::new(dir.path().join("nope"));
        assert!(matches!(
            Workspace::create(&spec),
            Err(WorkspaceError::RepoRoot { .. })
        ));
    }
}
