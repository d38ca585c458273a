//! Cache keys

use std::fmt;
use xstack_canon::ContentDigest;

/// Content-addressed key
///
/// Derived from an ordered list of parts, so `(group_id, profile, dep_hash)`
/// always maps to the same file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key over arbitrary ordered parts
    #[must_use]
    pub fn from_parts<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self(ContentDigest::compute_parts(parts).to_hex())
    }

    /// Key for a check-group result
    #[must_use]
    pub fn group(group_id: &str, profile: &str, dep_hash: &str) -> Self {
        Self::from_parts([group_id, profile, dep_hash])
    }

    /// Key as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
