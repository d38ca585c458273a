//! Identity manifest
//!
//! Content hashes of everything that defines how the tree is governed:
//! schemas, pack manifests, tool scripts and the canonical audit artifacts.

use crate::error::GateError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use walkdir::WalkDir;
use xstack_canon::{canonical_sha256, ArtifactClass, CanonicalArtifact, ContentDigest};
use xstack_workspace::SNAPSHOT_SKIP;

/// Manifest location, repo-relative
pub const IDENTITY_MANIFEST_FILE: &str = "docs/audit/identity/IDENTITY_MANIFEST.json";

/// Schema id of the manifest
pub const IDENTITY_SCHEMA_ID: &str = "xstack.identity_manifest";

/// Schema version of the manifest
pub const IDENTITY_SCHEMA_VERSION: &str = "1.0.0";

const PACK_MANIFEST: &str = "pack.json";
const AUDIT_PREFIX: &str = "docs/audit/";
const REMEDIATION_PREFIX: &str = "docs/audit/remediation/";

/// What an entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// `schema/**`
    Schema,
    /// `**/pack.json`
    PackManifest,
    /// `tools/**`, `scripts/**`
    Tool,
    /// CANONICAL `docs/audit/**/*.json`
    CanonicalArtifact,
}

/// One hashed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    /// Repo-relative path
    pub path: String,
    /// Entry kind
    pub kind: IdentityKind,
    /// Lowercase hex SHA-256 of the file bytes
    pub sha256: String,
}

/// Sorted identity entries and their fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityManifest {
    /// Entries sorted by path
    pub entries: Vec<IdentityEntry>,
    /// Canonical hash of `entries`
    pub fingerprint_sha256: String,
}

fn kind_of(rel: &str, bytes: &[u8]) -> Option<IdentityKind> {
    if rel.starts_with(AUDIT_PREFIX) {
        if rel == IDENTITY_MANIFEST_FILE
            || rel.starts_with(REMEDIATION_PREFIX)
            || !rel.ends_with(".json")
        {
            return None;
        }
        let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
        let canonical = value.get("artifact_class").and_then(serde_json::Value::as_str)
            == Some(ArtifactClass::Canonical.as_str());
        return canonical.then_some(IdentityKind::CanonicalArtifact);
    }
    if rel.starts_with("schema/") {
        return Some(IdentityKind::Schema);
    }
    if rel.starts_with("tools/") || rel.starts_with("scripts/") {
        return Some(IdentityKind::Tool);
    }
    if rel == PACK_MANIFEST || rel.ends_with("/pack.json") {
        return Some(IdentityKind::PackManifest);
    }
    None
}

impl IdentityManifest {
    /// Hash the identity-bearing files under `repo_root`
    ///
    /// # Errors
    /// Walk or read failures
    pub fn build(repo_root: &Path) -> Result<Self, GateError> {
        let walker = WalkDir::new(repo_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.depth() > 0
                    && e.file_type().is_dir()
                    && SNAPSHOT_SKIP.contains(&e.file_name().to_string_lossy().as_ref()))
            });

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(repo_root) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = std::fs::read(entry.path()).map_err(|e| GateError::io_error(entry.path(), e))?;
            if let Some(kind) = kind_of(&rel, &bytes) {
                entries.push(IdentityEntry {
                    path: rel,
                    kind,
                    sha256: ContentDigest::compute(&bytes).to_hex(),
                });
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let fingerprint_sha256 = canonical_sha256(&serde_json::to_value(&entries)?).to_hex();
        tracing::debug!(entries = entries.len(), fingerprint = %fingerprint_sha256, "identity manifest built");
        Ok(Self {
            entries,
            fingerprint_sha256,
        })
    }

    /// CANONICAL envelope
    #[must_use]
    pub fn to_artifact(&self) -> CanonicalArtifact {
        CanonicalArtifact::canonical(
            IDENTITY_SCHEMA_ID,
            IDENTITY_SCHEMA_VERSION,
            json!({
                "entries": self.entries,
                "fingerprint_sha256": self.fingerprint_sha256,
            }),
        )
    }

    /// Entries of `kind`
    pub fn of_kind(&self, kind: IdentityKind) -> impl Iterator<Item = &IdentityEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xstack_test_utils::TempRepo;

    fn repo() -> TempRepo {
        TempRepo::new()
            .file("schema/core/world.schema.json", "{\"schema_id\": \"dom.world\"}\n")
            .file("packs/base/pack.json", "{\"pack_id\": \"base\"}\n")
            .file("tools/bin/gate", "#!/bin/sh\n")
            .file("scripts/dev/run.py", "print()\n")
            .file("src/main.c", "int main;\n")
            .file(
                "docs/audit/auditx/FINDINGS.json",
                "{\"artifact_class\":\"CANONICAL\",\"schema_id\":\"f\",\"schema_version\":\"1\",\"record\":{}}\n",
            )
            .file(
                "docs/audit/view.json",
                "{\"artifact_class\":\"DERIVED_VIEW\",\"schema_id\":\"v\",\"schema_version\":\"1\",\"record\":{}}\n",
            )
            .file("docs/audit/remediation/ws/run-1/RUNLOG.json", "{}\n")
            .file("out/build/ws/x/tools/gate", "#!/bin/sh\n")
    }

    #[test]
    fn selects_identity_bearing_files() {
        let repo = repo();
        let manifest = IdentityManifest::build(repo.path()).unwrap();
        let paths: Vec<(&str, IdentityKind)> =
            manifest.entries.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        assert_eq!(
            paths,
            vec![
                ("docs/audit/auditx/FINDINGS.json", IdentityKind::CanonicalArtifact),
                ("packs/base/pack.json", IdentityKind::PackManifest),
                ("schema/core/world.schema.json", IdentityKind::Schema),
                ("scripts/dev/run.py", IdentityKind::Tool),
                ("tools/bin/gate", IdentityKind::Tool),
            ]
        );
    }

    #[test]
    fn manifest_excludes_itself_and_is_stable() {
        let repo = repo();
        let first = IdentityManifest::build(repo.path()).unwrap();
        let bytes = first.to_artifact().to_bytes().unwrap();
        repo.write(IDENTITY_MANIFEST_FILE, &String::from_utf8(bytes.clone()).unwrap());

        let second = IdentityManifest::build(repo.path()).unwrap();
        assert_eq!(first.fingerprint_sha256, second.fingerprint_sha256);
        assert_eq!(second.to_artifact().to_bytes().unwrap(), bytes);

        repo.write("schema/core/world.schema.json", "{\"schema_id\": \"dom.world2\"}\n");
        let third = IdentityManifest::build(repo.path()).unwrap();
        assert_ne!(first.fingerprint_sha256, third.fingerprint_sha256);
    }
}
