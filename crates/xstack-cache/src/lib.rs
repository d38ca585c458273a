//! xstack cache store
//!
//! Content-addressed cache of canonical artifacts, sharded per workspace:
//! `<repo>/.xstack_cache/<ws_id>/<domain>/<key>.json`. A moka layer sits in
//! front of the disk store; disk writes are temp-file + rename.

mod error;
mod key;
mod store;

pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use store::{CacheStats, CacheStore, CachedArtifact, CACHE_DIR};

/// Domain holding check-group results
pub const GROUP_DOMAIN: &str = "groups";

/// Domain holding restored repository graphs
pub const GRAPH_DOMAIN: &str = "graph";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
