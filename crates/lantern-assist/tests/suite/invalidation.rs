use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lantern_assist::{
    ImportCache, ImportRecord, Inspection, InspectionCache, InvalidationSource,
};
use lantern_cache::TtlCacheSettings;
use lantern_core::SymbolNavigator;
use lantern_vfs::{ExcludeFilter, FileChange, ManualFileWatcher, WatchEvent};

use super::support::{pet, pet_symbols, FixedNavigator, StaticProbe};

struct Fixture {
    probe: Arc<StaticProbe>,
    navigator: Arc<FixedNavigator>,
    imports: Arc<ImportCache>,
    inspections: Arc<InspectionCache>,
}

impl Fixture {
    fn new() -> Self {
        let probe = Arc::new(StaticProbe::default());
        let navigator = FixedNavigator::with(pet_symbols(0));
        let imports = Arc::new(ImportCache::new(TtlCacheSettings::default(), probe.clone()));
        let inspections = Arc::new(InspectionCache::new(
            navigator.clone() as Arc<dyn SymbolNavigator>
        ));
        Self {
            probe,
            navigator,
            imports,
            inspections,
        }
    }

    fn source(&self, watch_only_cached: bool) -> InvalidationSource {
        InvalidationSource::new(
            self.imports.clone(),
            self.inspections.clone(),
            ExcludeFilter::default(),
            watch_only_cached,
        )
    }

    async fn put(&self, path: &str) {
        self.imports
            .put(Path::new(path), vec![ImportRecord::new("x", "Foo")], Some(1), None)
            .await;
    }

    fn store_finding(&self, path: &str) {
        let document = pet(path);
        let symbol = self.navigator.symbol("Pet.describe");
        self.inspections
            .store(&document, &symbol, vec![Inspection::new("instanceof", "fix", 6, 6)], false);
    }

    fn has_finding(&self, path: &str) -> bool {
        self.inspections.has_valid_entries(&pet(path), None)
    }
}

fn modified(path: &str) -> WatchEvent {
    WatchEvent::Changes {
        changes: vec![FileChange::Modified {
            path: PathBuf::from(path),
        }],
    }
}

#[tokio::test]
async fn change_events_drop_cached_imports() {
    let fixture = Fixture::new();
    let source = fixture.source(true);
    fixture.put("/w/src/A.java").await;

    let hit = fixture.imports.get(Path::new("/w/src/A.java"), None).await;
    assert_eq!(hit, Some(vec![ImportRecord::new("x", "Foo")]));

    assert_eq!(source.apply(&modified("/w/src/A.java")).await, 1);
    assert_eq!(fixture.imports.get(Path::new("/w/src/A.java"), None).await, None);
    assert_eq!(source.apply(&modified("/w/src/B.java")).await, 0);
}

#[tokio::test]
async fn unwatched_mode_only_drops_changed_content() {
    let fixture = Fixture::new();
    let source = fixture.source(false);
    fixture.put("/w/src/A.java").await;

    assert_eq!(source.apply(&modified("/w/src/A.java")).await, 0);
    assert!(fixture.imports.contains(Path::new("/w/src/A.java")));

    fixture.probe.resize(42);
    assert_eq!(source.apply(&modified("/w/src/A.java")).await, 1);
    assert!(!fixture.imports.contains(Path::new("/w/src/A.java")));
}

#[tokio::test]
async fn deletes_and_moves_drop_both_caches() {
    let fixture = Fixture::new();
    let source = fixture.source(true);
    for path in ["/w/src/A.java", "/w/src/B.java"] {
        fixture.put(path).await;
        fixture.store_finding(path);
    }

    let event = WatchEvent::Changes {
        changes: vec![
            FileChange::Deleted {
                path: PathBuf::from("/w/src/A.java"),
            },
            FileChange::Moved {
                from: PathBuf::from("/w/src/B.java"),
                to: PathBuf::from("/w/src/C.java"),
            },
        ],
    };
    assert_eq!(source.apply(&event).await, 2);
    assert!(fixture.imports.is_empty());
    assert!(!fixture.has_finding("/w/src/A.java"));
    assert!(!fixture.has_finding("/w/src/B.java"));
}

fn renamed_over(from: &str, to: &str) -> WatchEvent {
    WatchEvent::Changes {
        changes: vec![FileChange::Moved {
            from: PathBuf::from(from),
            to: PathBuf::from(to),
        }],
    }
}

#[tokio::test]
async fn renaming_over_a_cached_file_drops_its_entries() {
    let fixture = Fixture::new();
    let source = fixture.source(true);
    fixture.put("/w/src/A.java").await;
    fixture.store_finding("/w/src/A.java");

    let event = renamed_over("/w/src/.A.java.tmp", "/w/src/A.java");
    assert_eq!(source.apply(&event).await, 1);
    assert_eq!(fixture.imports.get_fast(Path::new("/w/src/A.java"), None), None);
    assert!(!fixture.has_finding("/w/src/A.java"));
}

#[tokio::test]
async fn renaming_over_a_file_revalidates_its_target() {
    let fixture = Fixture::new();
    let source = fixture.source(false);
    fixture.put("/w/src/A.java").await;

    let event = renamed_over("/w/src/.A.java.tmp", "/w/src/A.java");
    assert_eq!(source.apply(&event).await, 0);
    assert!(fixture.imports.contains(Path::new("/w/src/A.java")));

    fixture.probe.resize(42);
    assert_eq!(source.apply(&event).await, 1);
    assert!(!fixture.imports.contains(Path::new("/w/src/A.java")));
}

#[tokio::test]
async fn excluded_paths_are_ignored() {
    let fixture = Fixture::new();
    let source = fixture.source(true);
    fixture.put("/w/target/Gen.java").await;
    fixture.store_finding("/w/target/Gen.java");

    let event = WatchEvent::Changes {
        changes: vec![FileChange::Deleted {
            path: PathBuf::from("/w/target/Gen.java"),
        }],
    };
    assert_eq!(source.apply(&event).await, 0);
    assert!(fixture.imports.contains(Path::new("/w/target/Gen.java")));
    assert!(fixture.has_finding("/w/target/Gen.java"));
}

#[tokio::test]
async fn rescans_clear_the_import_cache() {
    let fixture = Fixture::new();
    let source = fixture.source(true);
    fixture.put("/w/src/A.java").await;
    fixture.put("/w/src/B.java").await;

    assert_eq!(source.apply(&WatchEvent::Rescan).await, 2);
    assert!(fixture.imports.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pump_applies_watcher_events_until_stopped() {
    let fixture = Fixture::new();
    let source = Arc::new(fixture.source(true));
    fixture.put("/w/src/A.java").await;
    fixture.put("/w/src/B.java").await;

    let watcher = ManualFileWatcher::new();
    let injector = watcher.handle();
    let mut handle = source
        .spawn(watcher, tokio::runtime::Handle::current())
        .unwrap();

    injector
        .push_change(FileChange::Modified {
            path: PathBuf::from("/w/src/A.java"),
        })
        .unwrap();
    let mut dropped = false;
    for _ in 0..200 {
        if !fixture.imports.contains(Path::new("/w/src/A.java")) {
            dropped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped);

    handle.stop();
    assert!(handle.is_stopped());
    // The pump owned the watcher; once it is gone nothing can be delivered.
    assert!(injector
        .push_change(FileChange::Modified {
            path: PathBuf::from("/w/src/B.java"),
        })
        .is_err());
    assert!(fixture.imports.contains(Path::new("/w/src/B.java")));
}
