//! xstack canonical artifacts
//!
//! Deterministic JSON encoding, content digests and the artifact envelope
//! contract shared by every persisted governance document.
//!
//! # Core Concepts
//!
//! - [`canonicalize`] / [`serialize_canonical`]: stable byte form of any JSON value
//! - [`ContentDigest`]: 32-byte SHA-256 digest, hex on the wire
//! - [`CanonicalArtifact`]: `{artifact_class, schema_id, schema_version, record, extensions}`
//! - [`write_atomic`]: temp-file + rename persistence
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use xstack_canon::{canonical_sha256, serialize_canonical};
//!
//! let a = json!({"b": 1, "a": 2, "run_id": "r-17"});
//! let b = json!({"a": 2, "b": 1});
//! assert_eq!(serialize_canonical(&a), b"{\"a\":2,\"b\":1}\n".to_vec());
//! assert_eq!(canonical_sha256(&a), canonical_sha256(&b));
//! ```

mod artifact;
mod atomic;
mod canonical;
mod digest;
mod error;

pub use artifact::{check_value_contract, ArtifactClass, CanonicalArtifact};
pub use atomic::write_atomic;
pub use canonical::{
    canonical_sha256, canonicalize, canonicalize_with, find_forbidden_keys, serialize_canonical,
    serialize_canonical_with, ForbiddenKeys, LIST_PRIMARY_KEYS, RUN_META_KEYS,
};
pub use digest::{ContentDigest, DigestError};
pub use error::{CanonError, CanonResult};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
