//! Workspace identifiers

use std::fmt;
use std::path::Path;
use xstack_canon::ContentDigest;

/// Maximum id length
pub const MAX_ID_LEN: usize = 64;

/// Seed used when none is configured
pub const DEFAULT_SEED: &str = "xstack";

/// Stable lowercase workspace token, alphabet `[a-z0-9-]`, at most 64 chars
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Derive the id for a resolved repo root
    ///
    /// A non-empty discriminator wins (after sanitizing). Otherwise the id
    /// is `<seed>-<first 12 hex of the repo fingerprint>`.
    #[must_use]
    pub fn derive(repo_root: &Path, seed: &str, discriminator: Option<&str>) -> Self {
        if let Some(raw) = discriminator {
            let cleaned = sanitize(raw);
            if !cleaned.is_empty() {
                return Self(cleaned);
            }
        }
        let fp = fingerprint_path(repo_root);
        let seed = sanitize(seed);
        let seed = if seed.is_empty() { DEFAULT_SEED } else { &seed };
        Self(sanitize(&format!("{seed}-{fp}")))
    }

    /// Wrap an already-sanitized token
    ///
    /// Returns `None` if `raw` is not already in canonical form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = sanitize(raw);
        (!cleaned.is_empty() && cleaned == raw).then(|| Self(cleaned))
    }

    /// Token as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkspaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reduce arbitrary text to `[a-z0-9-]`, collapse dash runs, trim to 64 chars
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_ID_LEN));
    let mut last_dash = true;
    for ch in raw.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.truncate(MAX_ID_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Short digest of the resolved root path
fn fingerprint_path(root: &Path) -> String {
    ContentDigest::compute(root.to_string_lossy().as_bytes()).short()
}
