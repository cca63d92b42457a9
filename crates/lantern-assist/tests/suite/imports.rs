use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lantern_assist::{AssistError, ImportCache, ImportContextService, ImportRecord, ResponseFormat};
use lantern_cache::{DocumentVersions, TtlCacheSettings};
use lantern_scheduler::RetryPolicy;
use tokio_util::sync::CancellationToken;

use super::support::{FakeBackend, StaticProbe};

const WAIT: Duration = Duration::from_millis(50);

fn service_with(
    backend: Arc<FakeBackend>,
    retry: RetryPolicy,
) -> (ImportContextService, Arc<DocumentVersions>) {
    let versions = Arc::new(DocumentVersions::new());
    let cache = Arc::new(ImportCache::new(
        TtlCacheSettings::default(),
        Arc::new(StaticProbe::default()),
    ));
    let service = ImportContextService::new(cache, backend, versions.clone(), WAIT, retry);
    (service, versions)
}

fn no_retry() -> RetryPolicy {
    RetryPolicy {
        interval: Duration::from_millis(100),
        deadline: Duration::from_millis(50),
    }
}

#[tokio::test(start_paused = true)]
async fn resolved_imports_are_cached_with_the_open_version() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    let (service, versions) = service_with(backend.clone(), no_retry());
    let path = Path::new("/w/src/A.java");
    versions.set(path, 1);

    let cancel = CancellationToken::new();
    let first = service.imports(path, None, &cancel).await.unwrap();
    assert_eq!(first, vec![ImportRecord::new("x", "Foo")]);
    assert_eq!(service.cache().document_version(path), Some(1));

    let second = service.imports(path, None, &cancel).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(service.imports_fast(path, None), Some(first));
    assert_eq!(backend.import_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failures_are_returned_and_never_cached() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_imports(Err(AssistError::backend("connection refused")));
    let (service, _) = service_with(backend.clone(), no_retry());
    let path = Path::new("/w/src/A.java");
    let cancel = CancellationToken::new();

    let err = service.imports(path, None, &cancel).await.unwrap_err();
    assert_eq!(err, AssistError::Backend("connection refused".into()));
    assert!(service.imports_fast(path, None).is_none());

    let records = service.imports(path, None, &cancel).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(backend.import_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_within_the_deadline() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_imports(Err(AssistError::backend("busy")));
    backend.push_imports(Err(AssistError::backend("busy")));
    let retry = RetryPolicy {
        interval: Duration::from_millis(100),
        deadline: Duration::from_secs(1),
    };
    let (service, _) = service_with(backend.clone(), retry);

    let records = service
        .imports(Path::new("/w/src/A.java"), None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(records, vec![ImportRecord::new("x", "Foo")]);
    assert_eq!(backend.import_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_backend_call() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    let (service, _) = service_with(backend.clone(), no_retry());
    let path = Path::new("/w/src/A.java");
    let cancel = CancellationToken::new();

    let (a, b, c) = tokio::join!(
        service.imports(path, None, &cancel),
        service.imports(path, Some(10), &cancel),
        service.imports(path, Some(20), &cancel),
    );
    assert_eq!(a.unwrap(), b.clone().unwrap());
    assert_eq!(b.unwrap(), c.unwrap());
    assert_eq!(backend.import_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn an_empty_answer_is_a_cached_success() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_imports(Ok(Vec::new()));
    let (service, _) = service_with(backend.clone(), no_retry());
    let path = Path::new("/w/src/A.java");
    let cancel = CancellationToken::new();

    assert!(service.imports(path, None, &cancel).await.unwrap().is_empty());
    assert!(service.imports(path, None, &cancel).await.unwrap().is_empty());
    assert_eq!(backend.import_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_callers_stop_waiting() {
    let backend = FakeBackend::holding(ResponseFormat::Json);
    let (service, _) = service_with(backend.clone(), no_retry());
    let path = Path::new("/w/src/A.java");

    let cancel = CancellationToken::new();
    let pending = {
        let service = service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { service.imports(path, None, &cancel).await })
    };
    tokio::time::sleep(WAIT * 2).await;
    assert_eq!(backend.import_calls(), 1);

    cancel.cancel();
    assert_eq!(pending.await.unwrap(), Err(AssistError::Cancelled));

    // The shared call keeps running for others and fills the cache once released.
    backend.release(1);
    tokio::time::sleep(WAIT).await;
    assert!(service.imports_fast(path, None).is_some());
}
