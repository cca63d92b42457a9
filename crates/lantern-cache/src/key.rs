use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

/// A hash key identifying a cached resource.
///
/// This is intentionally opaque: all identifying parts are hashed into a fixed-size digest so
/// raw paths are not retained as map keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub(crate) fn from_hasher(hasher: Sha256) -> Self {
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Key of a filesystem resource (a document path).
    pub fn for_resource(path: &Path) -> Self {
        let mut builder = CacheKeyBuilder::new("lantern.resource");
        builder.push_str(&path.to_string_lossy());
        builder.finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight bytes are plenty to tell keys apart in logs.
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({self})")
    }
}

/// Incrementally build a [`CacheKey`] by hashing a sequence of typed fields.
pub struct CacheKeyBuilder {
    hasher: Sha256,
}

impl CacheKeyBuilder {
    pub fn new(namespace: &'static str) -> Self {
        let mut builder = Self {
            hasher: Sha256::new(),
        };
        builder.push_str(namespace);
        builder
    }

    pub fn push_str(&mut self, value: &str) {
        self.push_bytes(value.as_bytes());
    }

    pub fn push_bytes(&mut self, value: &[u8]) {
        // Length-prefix every field so ("ab", "c") and ("a", "bc") hash differently.
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value);
    }

    pub fn push_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    pub fn finish(self) -> CacheKey {
        CacheKey::from_hasher(self.hasher)
    }
}
