use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lantern_assist::{AssistError, AssistSession, ImportRecord, ResponseFormat};
use lantern_config::LanternConfig;
use lantern_vfs::{FileChange, ManualFileWatcher};
use tokio_util::sync::CancellationToken;

use super::support::{finding, json_response, pet, pet_symbols, FakeBackend, FixedNavigator, StaticProbe};

fn config() -> LanternConfig {
    LanternConfig::load_from_str(
        r#"
[cache]
maxCacheSize = 10

[inspection]
debounce_wait_ms = 10
retry_deadline_ms = 0
"#,
    )
    .unwrap()
}

fn session(backend: &Arc<FakeBackend>) -> AssistSession {
    AssistSession::with_probe(
        &config(),
        FixedNavigator::with(pet_symbols(0)),
        backend.clone(),
        Arc::new(StaticProbe::default()),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watched_changes_invalidate_session_imports() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    let session = session(&backend);
    let watcher = ManualFileWatcher::new();
    let injector = watcher.handle();
    session.attach_watcher(watcher).unwrap();

    let document = pet("/w/src/A.java");
    session.document_opened(&document);
    let cancel = CancellationToken::new();
    let records = session
        .imports()
        .imports(document.path(), None, &cancel)
        .await
        .unwrap();
    assert_eq!(records, vec![ImportRecord::new("x", "Foo")]);
    assert_eq!(
        session.imports().cache().document_version(document.path()),
        Some(1)
    );

    injector
        .push_change(FileChange::Modified {
            path: PathBuf::from("/w/src/A.java"),
        })
        .unwrap();
    let mut dropped = false;
    for _ in 0..200 {
        if session.imports().imports_fast(Path::new("/w/src/A.java"), None).is_none() {
            dropped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped);

    session
        .imports()
        .imports(document.path(), None, &cancel)
        .await
        .unwrap();
    assert_eq!(backend.import_calls(), 2);
    session.dispose();
}

#[tokio::test]
async fn closing_a_document_drops_its_inspections() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[finding("instanceof", 6, 6)])));
    let session = session(&backend);
    let document = pet("/w/src/Pet.java");
    session.document_opened(&document);

    session
        .inspections()
        .inspect_document(&document, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(session.stats().inspections.results, 1);

    session.document_closed(&document);
    assert!(session.inspections().cached(&document, None).is_empty());
    assert_eq!(session.stats().inspections.documents, 0);
}

#[tokio::test]
async fn stats_and_dispose() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    let session = session(&backend);
    let cancel = CancellationToken::new();
    let path = Path::new("/w/src/A.java");

    session.imports().imports(path, None, &cancel).await.unwrap();
    session.imports().imports(path, None, &cancel).await.unwrap();
    let stats = session.stats();
    assert_eq!(stats.imports.size, 1);
    assert_eq!(stats.imports.max_size, 10);
    assert_eq!(stats.inspections_in_flight, 0);

    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["imports"]["maxSize"], 10);
    assert_eq!(json["imports"]["accessCount"], 2);
    assert!(json.get("inspectionsInFlight").is_some());

    session.dispose();
    session.dispose();
    assert_eq!(session.stats().imports.size, 0);
    assert_eq!(
        session.imports().imports(path, None, &cancel).await,
        Err(AssistError::Cancelled)
    );
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let backend = FakeBackend::new(ResponseFormat::Json);
    let mut config = config();
    config.inspection.max_concurrency = 0;
    let result = AssistSession::with_probe(
        &config,
        FixedNavigator::with(Vec::new()),
        backend,
        Arc::new(StaticProbe::default()),
    );
    assert!(matches!(result, Err(AssistError::InvalidConfig(_))));
}
