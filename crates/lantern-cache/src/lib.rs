//! Caches for derived editor results.
//!
//! Two independent caches live here:
//! - [`SnapshotKeyedCache`]: per-symbol results that stay valid exactly as long as the symbol's
//!   text is unchanged.
//! - [`BoundedTtlCache`]: per-resource values with a time-to-live, LRU eviction and cheap
//!   fingerprint revalidation.

mod fingerprint;
mod key;
mod snapshot;
mod ttl;

use serde::Serialize;

pub use fingerprint::{
    ContentFingerprint, DocumentVersions, FingerprintProbe, FsFingerprintProbe, SnapshotId,
};
pub use key::{CacheKey, CacheKeyBuilder};
pub use snapshot::{DerivedResult, SnapshotCacheStats, SnapshotKeyedCache};
pub use ttl::{BoundedTtlCache, SweeperHandle, TtlCacheSettings};

/// Point-in-time counters of a [`BoundedTtlCache`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub access_count: u64,
    pub max_size: usize,
    /// Fraction of lookups that were hits; `None` before the first lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_rate: Option<f64>,
}
