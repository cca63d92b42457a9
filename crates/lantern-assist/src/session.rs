use std::io;
use std::sync::Arc;

use lantern_cache::{
    BoundedTtlCache, CacheStats, DocumentVersions, FingerprintProbe, FsFingerprintProbe,
    SnapshotCacheStats, SnapshotKeyedCache, SweeperHandle,
};
use lantern_config::LanternConfig;
use lantern_core::{SymbolNavigator, TextDocument};
use lantern_vfs::FileWatcher;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;

use crate::{
    AssistBackend, AssistError, ImportContextService, InspectionService, InvalidationHandle,
    InvalidationSource,
};

/// Point-in-time counters of a session's caches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub imports: CacheStats,
    pub inspections: SnapshotCacheStats,
    pub inspections_in_flight: usize,
}

/// Everything one editor workspace needs: caches, services and their background tasks.
///
/// Must be created inside a Tokio runtime (the cache sweeper is a Tokio task).
pub struct AssistSession {
    versions: Arc<DocumentVersions>,
    imports: ImportContextService,
    inspections: InspectionService,
    invalidation: Arc<InvalidationSource>,
    sweeper: Mutex<Option<SweeperHandle>>,
    pumps: Mutex<Vec<InvalidationHandle>>,
}

impl AssistSession {
    pub fn new(
        config: &LanternConfig,
        navigator: Arc<dyn SymbolNavigator>,
        backend: Arc<dyn AssistBackend>,
    ) -> Result<Self, AssistError> {
        let versions = Arc::new(DocumentVersions::new());
        let probe = Arc::new(FsFingerprintProbe::new(Arc::clone(&versions)));
        Self::build(config, navigator, backend, versions, probe)
    }

    /// Like [`AssistSession::new`], with a custom fingerprint source.
    pub fn with_probe(
        config: &LanternConfig,
        navigator: Arc<dyn SymbolNavigator>,
        backend: Arc<dyn AssistBackend>,
        probe: Arc<dyn FingerprintProbe>,
    ) -> Result<Self, AssistError> {
        Self::build(config, navigator, backend, Arc::new(DocumentVersions::new()), probe)
    }

    fn build(
        config: &LanternConfig,
        navigator: Arc<dyn SymbolNavigator>,
        backend: Arc<dyn AssistBackend>,
        versions: Arc<DocumentVersions>,
        probe: Arc<dyn FingerprintProbe>,
    ) -> Result<Self, AssistError> {
        config.validate()?;

        let import_cache = Arc::new(BoundedTtlCache::new(config.cache.ttl_settings(), probe));
        let inspection_cache = Arc::new(SnapshotKeyedCache::new(Arc::clone(&navigator)));
        let sweeper = import_cache.spawn_sweeper();

        let imports = ImportContextService::new(
            Arc::clone(&import_cache),
            Arc::clone(&backend),
            Arc::clone(&versions),
            config.inspection.debounce_wait(),
            config.inspection.retry_policy(),
        );
        let inspections = InspectionService::new(
            Arc::clone(&inspection_cache),
            navigator,
            backend,
            config.inspection.gate_settings(),
            config.inspection.debounce_wait(),
        );
        let invalidation = Arc::new(InvalidationSource::new(
            import_cache,
            inspection_cache,
            config.cache.exclude_filter(),
            config.cache.watch_only_cached_files,
        ));

        tracing::debug!(
            target = "lantern.assist",
            max_cache_size = config.cache.max_cache_size,
            max_concurrency = config.inspection.max_concurrency,
            "assist session started"
        );

        Ok(Self {
            versions,
            imports,
            inspections,
            invalidation,
            sweeper: Mutex::new(Some(sweeper)),
            pumps: Mutex::new(Vec::new()),
        })
    }

    pub fn imports(&self) -> &ImportContextService {
        &self.imports
    }

    pub fn inspections(&self) -> &InspectionService {
        &self.inspections
    }

    pub fn invalidation(&self) -> &Arc<InvalidationSource> {
        &self.invalidation
    }

    pub fn document_opened(&self, document: &TextDocument) {
        self.versions.set(document.path(), document.version());
    }

    pub fn document_changed(&self, document: &TextDocument) {
        self.versions.set(document.path(), document.version());
    }

    pub fn document_closed(&self, document: &TextDocument) {
        self.versions.remove(document.path());
        self.inspections.cache().invalidate_document(document.key());
    }

    /// Feeds `watcher` into the caches until the session is disposed.
    pub fn attach_watcher<W>(&self, watcher: W) -> io::Result<()>
    where
        W: FileWatcher + 'static,
    {
        let runtime = Handle::try_current().map_err(io::Error::other)?;
        let handle = Arc::clone(&self.invalidation).spawn(watcher, runtime)?;
        self.pumps.lock().push(handle);
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            imports: self.imports.cache().stats(),
            inspections: self.inspections.cache().stats(),
            inspections_in_flight: self.inspections.in_flight(),
        }
    }

    /// Stops background work and drops every cached entry. Idempotent.
    pub fn dispose(&self) {
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        let pumps: Vec<InvalidationHandle> = self.pumps.lock().drain(..).collect();
        for mut pump in pumps {
            pump.stop();
        }
        self.imports.dispose();
        self.inspections.dispose();
        self.imports.cache().clear();
        self.inspections.cache().clear();
        tracing::debug!(target = "lantern.assist", "assist session disposed");
    }
}

impl Drop for AssistSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
