use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lantern_cache::{BoundedTtlCache, DocumentVersions};
use lantern_scheduler::{retry_on_failure, run_cancellable, KeyedCoalescer, RetryPolicy};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{AssistBackend, AssistError};

/// An import statement available to a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub uri: String,
    pub class_name: String,
}

impl ImportRecord {
    pub fn new(uri: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            class_name: class_name.into(),
        }
    }
}

pub type ImportCache = BoundedTtlCache<Vec<ImportRecord>>;

/// Import context of documents, served from a TTL cache and resolved by the backend on a
/// miss.
///
/// Concurrent misses for the same document are debounced into one backend call. Failures
/// are returned to every waiter and never cached.
#[derive(Clone)]
pub struct ImportContextService {
    cache: Arc<ImportCache>,
    backend: Arc<dyn AssistBackend>,
    versions: Arc<DocumentVersions>,
    coalescer: KeyedCoalescer<PathBuf, Vec<ImportRecord>, AssistError>,
    debounce_wait: Duration,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl ImportContextService {
    pub fn new(
        cache: Arc<ImportCache>,
        backend: Arc<dyn AssistBackend>,
        versions: Arc<DocumentVersions>,
        debounce_wait: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            backend,
            versions,
            coalescer: KeyedCoalescer::new(),
            debounce_wait,
            retry,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn cache(&self) -> &Arc<ImportCache> {
        &self.cache
    }

    /// Imports of the document at `path`.
    ///
    /// `cursor_offset` is only consulted when the cache is position sensitive. Cancelling
    /// `cancel` abandons this caller's wait; the shared backend call keeps running for the
    /// other waiters.
    pub async fn imports(
        &self,
        path: &Path,
        cursor_offset: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImportRecord>, AssistError> {
        if let Some(hit) = self.cache.get(path, cursor_offset).await {
            return Ok(hit);
        }

        let cache = Arc::clone(&self.cache);
        let backend = Arc::clone(&self.backend);
        let versions = Arc::clone(&self.versions);
        let retry = self.retry;
        let shutdown = self.shutdown.clone();
        let resource = path.to_path_buf();
        let operation = move || async move {
            let records = retry_on_failure(retry, &shutdown, || {
                backend.resolve_imports(&resource, shutdown.clone())
            })
            .await?;
            tracing::debug!(
                target = "lantern.assist",
                resource = %resource.display(),
                count = records.len(),
                "resolved imports"
            );
            cache
                .put(&resource, records.clone(), versions.get(&resource), cursor_offset)
                .await;
            Ok(records)
        };

        let pending = self
            .coalescer
            .debounce(path.to_path_buf(), self.debounce_wait, operation);
        match run_cancellable(cancel, pending).await? {
            Ok(records) => Ok(records),
            Err(err) => {
                if !err.is_cancelled() {
                    tracing::warn!(
                        target = "lantern.assist",
                        resource = %path.display(),
                        error = %err,
                        "failed to resolve imports"
                    );
                }
                Err(err)
            }
        }
    }

    /// Cache-only lookup: never fingerprints and never calls the backend.
    pub fn imports_fast(&self, path: &Path, cursor_offset: Option<u32>) -> Option<Vec<ImportRecord>> {
        self.cache.get_fast(path, cursor_offset)
    }

    /// Cancels pending debounced lookups and any backend call still retrying.
    pub fn dispose(&self) {
        self.coalescer.cancel_all();
        self.shutdown.cancel();
    }
}
