//! Check groups and their registry
//!
//! Groups are declared in `data/registries/gate_groups.json` as
//! `{"groups": [...]}`. A group's `dep_hash` covers the content of its
//! dependency roots plus the group definition itself, so editing the
//! command or profiles invalidates cached results.

use crate::error::{KernelError, KernelResult};
use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use xstack_canon::{canonical_sha256, ContentDigest};
use xstack_graph::{is_skipped, rel_path, WalkOptions};

/// Default registry location, relative to the repo root
pub const DEFAULT_GROUPS_FILE: &str = "data/registries/gate_groups.json";

/// Map key holding the definition hash inside `dep_hash`
pub const DEFINITION_KEY: &str = "@definition";

/// Placeholder hash for dependency roots that do not exist
const MISSING: &str = "missing";

/// Repo-relative files the gate driver rewrites on every run
///
/// Never part of a dependency hash, so a docs-rooted group stays warm.
pub const DRIVER_OUTPUT_FILES: [&str; 3] = [
    "docs/audit/auditx/FINDINGS.json",
    "docs/audit/auditx/FINDINGS_TREND.json",
    "docs/audit/identity/IDENTITY_MANIFEST.json",
];

/// One gate check group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckGroup {
    /// Unique id, e.g. `repox.structure`
    pub group_id: String,
    /// Suite the group belongs to (`repox`, `testx`, ...)
    #[serde(default)]
    pub suite: String,
    /// Repo-relative files or directories whose content the result depends on
    #[serde(default)]
    pub dep_roots: Vec<String>,
    /// Watch prefixes used to decide whether a change impacts the group
    #[serde(default)]
    pub paths: Vec<String>,
    /// Command line; the first element is resolved on the workspace `PATH`
    pub runner_command: Vec<String>,
    /// Profiles the group runs in
    #[serde(default = "all_profiles")]
    pub profiles: Vec<Profile>,
    /// Groups that must finish first
    #[serde(default)]
    pub deps: Vec<String>,
    /// Per-group soft timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn all_profiles() -> Vec<Profile> {
    Profile::ALL.to_vec()
}

impl CheckGroup {
    /// Whether the group is part of `profile`
    #[must_use]
    pub fn runs_in(&self, profile: Profile) -> bool {
        self.profiles.contains(&profile)
    }

    /// Suite, falling back to the group id prefix
    #[must_use]
    pub fn suite(&self) -> &str {
        if self.suite.is_empty() {
            self.group_id.split('.').next().unwrap_or(&self.group_id)
        } else {
            &self.suite
        }
    }

    /// Executable name (first element of the command)
    #[must_use]
    pub fn runner_id(&self) -> &str {
        self.runner_command.first().map_or("", String::as_str)
    }

    /// Watch prefixes; dependency roots when none are declared
    #[must_use]
    pub fn watch_paths(&self) -> &[String] {
        if self.paths.is_empty() {
            &self.dep_roots
        } else {
            &self.paths
        }
    }

    /// Whether any of `changed` falls under a watch prefix
    #[must_use]
    pub fn impacted_by(&self, changed: &[String]) -> bool {
        changed.iter().any(|file| {
            self.watch_paths().iter().any(|prefix| {
                let prefix = prefix.trim_end_matches('/');
                prefix.is_empty()
                    || file == prefix
                    || (file.starts_with(prefix) && file.as_bytes().get(prefix.len()) == Some(&b'/'))
            })
        })
    }

    /// Canonical hash of the definition
    #[must_use]
    pub fn definition_digest(&self) -> ContentDigest {
        canonical_sha256(&serde_json::to_value(self).unwrap_or(Value::Null))
    }
}

/// Content hash of one dependency root
///
/// Walks with the graph skip set (legacy code included) and leaves out
/// [`DRIVER_OUTPUT_FILES`].
fn hash_dep_root(repo_root: &Path, rel: &str) -> KernelResult<String> {
    let path = repo_root.join(rel);
    let meta = match std::fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MISSING.to_owned()),
        Err(e) => return Err(KernelError::io_error(path, e)),
    };
    if meta.is_file() {
        let bytes = std::fs::read(&path).map_err(|e| KernelError::io_error(&path, e))?;
        return Ok(ContentDigest::compute(&bytes).to_hex());
    }

    let opts = WalkOptions {
        include_legacy: true,
        extra_skip: Vec::new(),
    };
    let mut parts: Vec<String> = Vec::new();
    let walker = WalkDir::new(&path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.file_name().to_string_lossy().starts_with(".tmp") {
                return false;
            }
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            rel_path(repo_root, e.path()).map_or(true, |repo_rel| !is_skipped(&repo_rel, &opts))
        });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) => continue,
            Err(e) => {
                let at = e.path().map_or_else(|| path.clone(), Path::to_path_buf);
                return Err(KernelError::io_error(at, std::io::Error::other(e.to_string())));
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if rel_path(repo_root, entry.path()).is_some_and(|repo_rel| DRIVER_OUTPUT_FILES.contains(&repo_rel.as_str())) {
            continue;
        }
        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(KernelError::io_error(entry.path(), e)),
        };
        parts.push(rel_path(&path, entry.path()).unwrap_or_default());
        parts.push(ContentDigest::compute(&bytes).to_hex());
    }
    Ok(ContentDigest::compute_parts(&parts).to_hex())
}

/// Dependency hash of `group`
///
/// Canonical hash of `{dep_root: content_hash, "@definition": definition_hash}`.
///
/// # Errors
/// Unreadable dependency content
pub fn dep_hash(repo_root: &Path, group: &CheckGroup) -> KernelResult<ContentDigest> {
    let mut entries: BTreeMap<String, String> = BTreeMap::new();
    for root in &group.dep_roots {
        let key = root.trim_end_matches('/').to_owned();
        let hash = hash_dep_root(repo_root, &key)?;
        entries.insert(key, hash);
    }
    entries.insert(DEFINITION_KEY.to_owned(), group.definition_digest().to_hex());
    Ok(canonical_sha256(&serde_json::to_value(entries)?))
}

/// Relative and free of `..`
fn is_repo_relative(root: &str) -> bool {
    Path::new(root)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    groups: Vec<CheckGroup>,
}

/// Registered check groups keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRegistry {
    groups: BTreeMap<String, CheckGroup>,
}

impl GroupRegistry {
    /// Registry over `groups`
    ///
    /// # Errors
    /// Duplicate ids, empty commands, dependency roots outside the repo
    /// or dependencies on unknown groups
    pub fn from_groups(groups: Vec<CheckGroup>) -> KernelResult<Self> {
        Self::build(groups, Path::new(DEFAULT_GROUPS_FILE))
    }

    fn build(groups: Vec<CheckGroup>, origin: &Path) -> KernelResult<Self> {
        let mut map = BTreeMap::new();
        for mut group in groups {
            if group.runner_command.is_empty() {
                return Err(KernelError::registry(
                    origin,
                    format!("group {} has an empty runner_command", group.group_id),
                ));
            }
            if let Some(bad) = group
                .dep_roots
                .iter()
                .chain(&group.paths)
                .find(|root| !is_repo_relative(root))
            {
                return Err(KernelError::registry(
                    origin,
                    format!("group {} names {bad:?}, which is not a repo-relative path", group.group_id),
                ));
            }
            group.deps.sort();
            group.deps.dedup();
            let id = group.group_id.clone();
            if map.insert(id.clone(), group).is_some() {
                return Err(KernelError::registry(origin, format!("duplicate group id {id}")));
            }
        }
        for group in map.values() {
            if let Some(dep) = group.deps.iter().find(|d| !map.contains_key(*d)) {
                return Err(KernelError::UnknownDependency {
                    group: group.group_id.clone(),
                    dep: dep.clone(),
                });
            }
        }
        Ok(Self { groups: map })
    }

    /// Parse registry JSON
    ///
    /// # Errors
    /// Malformed JSON or an invalid registry
    pub fn from_slice(bytes: &[u8], origin: &Path) -> KernelResult<Self> {
        let file: RegistryFile = serde_json::from_slice(bytes)
            .map_err(|e| KernelError::registry(origin, e.to_string()))?;
        Self::build(file.groups, origin)
    }

    /// Load `<repo_root>/<rel>`
    ///
    /// # Errors
    /// Missing file, malformed JSON or an invalid registry
    pub fn load(repo_root: &Path, rel: &str) -> KernelResult<Self> {
        let path: PathBuf = repo_root.join(rel);
        let bytes = std::fs::read(&path).map_err(|e| KernelError::io_error(&path, e))?;
        let registry = Self::from_slice(&bytes, &path)?;
        tracing::debug!(groups = registry.len(), path = %path.display(), "group registry loaded");
        Ok(registry)
    }

    /// Group by id
    #[must_use]
    pub fn get(&self, group_id: &str) -> Option<&CheckGroup> {
        self.groups.get(group_id)
    }

    /// Groups in id order
    pub fn iter(&self) -> impl Iterator<Item = &CheckGroup> {
        self.groups.values()
    }

    /// Number of groups
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// No groups
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
