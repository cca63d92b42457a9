//! Bounded, TTL-expiring cache keyed by resource identity.
//!
//! Entries expire `ttl` after insertion. When the cache is full, inserting a new resource
//! evicts exactly one entry: the least recently accessed one. Access recency is tracked by a
//! monotonically increasing tick rather than wall-clock time, so two accesses within the same
//! clock tick still have a strict order.
//!
//! Reads come in two flavours:
//! - [`BoundedTtlCache::get`] re-fingerprints the backing file (a `stat`) and evicts entries
//!   whose content changed. This is the authoritative path; it may suspend.
//! - [`BoundedTtlCache::get_fast`] trusts TTL (and position proximity) only and never
//!   suspends.
//!
//! Fingerprint I/O failures are treated as "unchanged": a flaky filesystem must not thrash
//! the cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{CacheKey, CacheStats, ContentFingerprint, FingerprintProbe};

/// Settings for a [`BoundedTtlCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlCacheSettings {
    pub ttl: Duration,
    pub max_entries: usize,
    pub cleanup_interval: Duration,
    pub content_hashing: bool,
    pub position_sensitive: bool,
    pub max_caret_distance: u32,
}

impl Default for TtlCacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_entries: 100,
            cleanup_interval: Duration::from_secs(60),
            content_hashing: true,
            position_sensitive: false,
            max_caret_distance: 8192,
        }
    }
}

#[derive(Debug)]
struct TtlEntry<V> {
    id: u64,
    resource: PathBuf,
    value: V,
    created_at: Instant,
    last_access: u64,
    document_version: Option<i32>,
    fingerprint: Option<ContentFingerprint>,
    position_hint: Option<u32>,
}

#[derive(Debug)]
struct TtlInner<V> {
    map: HashMap<CacheKey, TtlEntry<V>>,
    next_id: u64,
    tick: u64,
    access_count: u64,
    hits: u64,
    misses: u64,
}

impl<V> Default for TtlInner<V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            next_id: 1,
            tick: 0,
            access_count: 0,
            hits: 0,
            misses: 0,
        }
    }
}

impl<V> TtlInner<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_least_recently_used(&mut self) -> Option<TtlEntry<V>> {
        let key = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| *key)?;
        self.map.remove(&key)
    }
}

enum Lookup<V> {
    Miss,
    Hit(V),
    Verify {
        id: u64,
        stored: ContentFingerprint,
    },
}

pub struct BoundedTtlCache<V> {
    settings: TtlCacheSettings,
    probe: Arc<dyn FingerprintProbe>,
    inner: Mutex<TtlInner<V>>,
}

impl<V: Clone + Send + Sync + 'static> BoundedTtlCache<V> {
    pub fn new(settings: TtlCacheSettings, probe: Arc<dyn FingerprintProbe>) -> Self {
        Self {
            settings: TtlCacheSettings {
                max_entries: settings.max_entries.max(1),
                ..settings
            },
            probe,
            inner: Mutex::new(TtlInner::default()),
        }
    }

    pub fn settings(&self) -> &TtlCacheSettings {
        &self.settings
    }

    /// Authoritative lookup: TTL, position proximity, then a fresh fingerprint comparison.
    pub async fn get(&self, resource: &Path, position_hint: Option<u32>) -> Option<V> {
        let key = CacheKey::for_resource(resource);
        let (id, stored) = match self.lookup(key, position_hint, self.settings.content_hashing) {
            Lookup::Miss => return None,
            Lookup::Hit(value) => return Some(value),
            Lookup::Verify { id, stored } => (id, stored),
        };

        match self.probe.fingerprint(resource).await {
            Ok(fresh) if !stored.matches(&fresh) => {
                let mut inner = self.inner.lock();
                if inner.map.get(&key).is_some_and(|entry| entry.id == id) {
                    inner.map.remove(&key);
                }
                inner.misses += 1;
                tracing::debug!(
                    target = "lantern.cache",
                    key = %key,
                    resource = %resource.display(),
                    "fingerprint changed; evicted entry"
                );
                return None;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    target = "lantern.cache",
                    key = %key,
                    resource = %resource.display(),
                    error = %err,
                    "failed to fingerprint resource; assuming unchanged"
                );
            }
        }

        // The entry may have been replaced or invalidated while we were probing.
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        match inner.map.get_mut(&key) {
            Some(entry) if entry.id == id => {
                entry.last_access = tick;
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            _ => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Lookup that trusts TTL and position proximity without fingerprint I/O.
    pub fn get_fast(&self, resource: &Path, position_hint: Option<u32>) -> Option<V> {
        let key = CacheKey::for_resource(resource);
        match self.lookup(key, position_hint, false) {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Verify { .. } => None,
        }
    }

    fn lookup(&self, key: CacheKey, position_hint: Option<u32>, verify: bool) -> Lookup<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.access_count += 1;

        let Some(entry) = inner.map.get(&key) else {
            inner.misses += 1;
            tracing::trace!(target = "lantern.cache", key = %key, "ttl cache miss");
            return Lookup::Miss;
        };

        if now.saturating_duration_since(entry.created_at) >= self.settings.ttl {
            inner.map.remove(&key);
            inner.misses += 1;
            tracing::debug!(target = "lantern.cache", key = %key, "ttl cache entry expired");
            return Lookup::Miss;
        }

        if self.settings.position_sensitive && !self.near(entry.position_hint, position_hint) {
            inner.misses += 1;
            tracing::debug!(
                target = "lantern.cache",
                key = %key,
                "cursor moved too far from cached position"
            );
            return Lookup::Miss;
        }

        if verify {
            if let Some(stored) = entry.fingerprint {
                return Lookup::Verify {
                    id: entry.id,
                    stored,
                };
            }
        }

        let tick = inner.next_tick();
        let Some(entry) = inner.map.get_mut(&key) else {
            return Lookup::Miss;
        };
        entry.last_access = tick;
        let value = entry.value.clone();
        inner.hits += 1;
        Lookup::Hit(value)
    }

    fn near(&self, cached: Option<u32>, query: Option<u32>) -> bool {
        match (cached, query) {
            (Some(cached), Some(query)) => cached.abs_diff(query) <= self.settings.max_caret_distance,
            _ => true,
        }
    }

    /// Inserts `value` for `resource`, evicting the least recently used entry when full.
    pub async fn put(
        &self,
        resource: &Path,
        value: V,
        document_version: Option<i32>,
        position_hint: Option<u32>,
    ) {
        let key = CacheKey::for_resource(resource);
        let fingerprint = if self.settings.content_hashing {
            match self.probe.fingerprint(resource).await {
                Ok(fresh) => Some(ContentFingerprint {
                    document_version: document_version.or(fresh.document_version),
                    ..fresh
                }),
                Err(err) => {
                    tracing::debug!(
                        target = "lantern.cache",
                        key = %key,
                        resource = %resource.display(),
                        error = %err,
                        "failed to fingerprint resource; caching without fingerprint"
                    );
                    None
                }
            }
        } else {
            None
        };

        let mut inner = self.inner.lock();
        if !inner.map.contains_key(&key) && inner.map.len() >= self.settings.max_entries {
            if let Some(evicted) = inner.evict_least_recently_used() {
                tracing::debug!(
                    target = "lantern.cache",
                    resource = %evicted.resource.display(),
                    "evicted least recently used entry"
                );
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let tick = inner.next_tick();
        inner.map.insert(
            key,
            TtlEntry {
                id,
                resource: resource.to_path_buf(),
                value,
                created_at: Instant::now(),
                last_access: tick,
                document_version,
                fingerprint,
                position_hint,
            },
        );
    }

    /// Re-fingerprints `resource` and drops its entry if the content changed.
    ///
    /// Returns `true` if an entry was removed. I/O failures keep the entry.
    pub async fn revalidate(&self, resource: &Path) -> bool {
        let key = CacheKey::for_resource(resource);
        let (id, stored) = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.map.get(&key) else {
                return false;
            };
            match entry.fingerprint {
                Some(stored) => (entry.id, stored),
                // Nothing to compare against; a change event is all we know.
                None => {
                    inner.map.remove(&key);
                    return true;
                }
            }
        };

        let fresh = match self.probe.fingerprint(resource).await {
            Ok(fresh) => fresh,
            Err(err) => {
                tracing::debug!(
                    target = "lantern.cache",
                    resource = %resource.display(),
                    error = %err,
                    "failed to fingerprint resource during revalidation"
                );
                return false;
            }
        };
        if stored.matches(&fresh) {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.map.get(&key).is_some_and(|entry| entry.id == id) {
            inner.map.remove(&key);
            return true;
        }
        false
    }

    /// Document version recorded when `resource` was cached, if any.
    pub fn document_version(&self, resource: &Path) -> Option<i32> {
        self.inner
            .lock()
            .map
            .get(&CacheKey::for_resource(resource))
            .and_then(|entry| entry.document_version)
    }

    pub fn contains(&self, resource: &Path) -> bool {
        self.inner
            .lock()
            .map
            .contains_key(&CacheKey::for_resource(resource))
    }

    pub fn invalidate(&self, resource: &Path) -> bool {
        let key = CacheKey::for_resource(resource);
        let removed = self.inner.lock().map.remove(&key).is_some();
        if removed {
            tracing::debug!(
                target = "lantern.cache",
                key = %key,
                resource = %resource.display(),
                "invalidated entry"
            );
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.lock().map.clear();
    }

    /// Drops every expired entry. Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.settings.ttl;
        let mut inner = self.inner.lock();
        let before = inner.map.len();
        inner
            .map
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < ttl);
        let removed = before - inner.map.len();
        if removed > 0 {
            tracing::debug!(target = "lantern.cache", removed, "swept expired entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            size: inner.map.len(),
            access_count: inner.access_count,
            max_size: self.settings.max_entries,
            hit_rate: (lookups > 0).then(|| inner.hits as f64 / lookups as f64),
        }
    }

    /// Starts a background task running [`BoundedTtlCache::sweep_expired`] every
    /// `cleanup_interval`, independent of access patterns.
    ///
    /// The task holds only a weak reference; it exits when the cache is dropped or the handle
    /// is stopped. Must be called from within a Tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let token = CancellationToken::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.cleanup_interval.max(Duration::from_millis(1));
        let token_for_task = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token_for_task.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(cache) = weak.upgrade() else {
                            break;
                        };
                        cache.sweep_expired();
                    }
                }
            }
        });

        SweeperHandle {
            token,
            handle: Some(handle),
        }
    }
}

/// Owner of a periodic sweep task. Stopping (or dropping) the handle ends the task.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
