use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

/// Identity of the exact text of a symbol.
///
/// Two snapshots are equal iff the text is byte-identical. This is a truncated SHA-256; only
/// collision resistance for the lifetime of a session matters, not cryptographic strength.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId([u8; 16]);

impl SnapshotId {
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({self})")
    }
}

/// Cheap file-level identity: document version, modification time and size.
///
/// Recomputing it only needs a `stat`, never the file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint {
    pub document_version: Option<i32>,
    pub modified_nanos: u128,
    pub size: u64,
}

impl ContentFingerprint {
    /// Fingerprint from `std::fs::Metadata`.
    ///
    /// A missing or pre-epoch mtime is recorded as `0`.
    pub fn from_metadata(meta: &std::fs::Metadata, document_version: Option<i32>) -> Self {
        let modified_nanos = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|dur| dur.as_nanos())
            .unwrap_or(0);
        Self {
            document_version,
            modified_nanos,
            size: meta.len(),
        }
    }

    /// Returns `true` if `fresh` describes the same content as `self`.
    ///
    /// Document versions are only compared when both sides know one: a resource that is not
    /// open in the editor has no version.
    pub fn matches(&self, fresh: &ContentFingerprint) -> bool {
        let versions_agree = match (self.document_version, fresh.document_version) {
            (Some(stored), Some(current)) => stored == current,
            _ => true,
        };
        versions_agree && self.modified_nanos == fresh.modified_nanos && self.size == fresh.size
    }
}

/// Computes fresh fingerprints for cached resources.
#[async_trait]
pub trait FingerprintProbe: Send + Sync {
    async fn fingerprint(&self, resource: &Path) -> io::Result<ContentFingerprint>;
}

/// Versions of documents currently open in the editor.
///
/// Updated by the editor integration on open/change/close.
#[derive(Debug, Default)]
pub struct DocumentVersions {
    versions: RwLock<HashMap<PathBuf, i32>>,
}

impl DocumentVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: impl Into<PathBuf>, version: i32) {
        self.versions.write().insert(path.into(), version);
    }

    pub fn remove(&self, path: &Path) {
        self.versions.write().remove(path);
    }

    pub fn get(&self, path: &Path) -> Option<i32> {
        self.versions.read().get(path).copied()
    }
}

/// [`FingerprintProbe`] backed by the local filesystem.
#[derive(Debug, Default)]
pub struct FsFingerprintProbe {
    versions: std::sync::Arc<DocumentVersions>,
}

impl FsFingerprintProbe {
    pub fn new(versions: std::sync::Arc<DocumentVersions>) -> Self {
        Self { versions }
    }
}

#[async_trait]
impl FingerprintProbe for FsFingerprintProbe {
    async fn fingerprint(&self, resource: &Path) -> io::Result<ContentFingerprint> {
        let meta = tokio::fs::metadata(resource).await?;
        Ok(ContentFingerprint::from_metadata(
            &meta,
            self.versions.get(resource),
        ))
    }
}
