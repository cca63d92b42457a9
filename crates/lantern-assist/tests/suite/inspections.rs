use std::sync::Arc;
use std::time::Duration;

use lantern_assist::{
    AssistError, InspectionCache, InspectionOutcome, InspectionService, ResponseFormat,
};
use lantern_core::{SymbolNavigator, TextDocument};
use lantern_scheduler::{GateBusy, GateSettings};
use tokio_util::sync::CancellationToken;

use super::support::{finding, json_response, pet, pet_symbols, FakeBackend, FixedNavigator, PET};

fn service(navigator: &Arc<FixedNavigator>, backend: &Arc<FakeBackend>) -> InspectionService {
    let navigator: Arc<dyn SymbolNavigator> = navigator.clone();
    InspectionService::new(
        Arc::new(InspectionCache::new(navigator.clone())),
        navigator,
        backend.clone(),
        GateSettings { max_concurrency: 3 },
        Duration::from_millis(100),
    )
}

fn lines(outcome: &InspectionOutcome) -> Vec<u32> {
    outcome.inspections().iter().map(|i| i.start_line()).collect()
}

async fn wait_for_in_flight(service: &InspectionService, expected: usize) {
    while service.in_flight() != expected {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn document_findings_are_located_and_cached() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[
        finding("Using instanceof with an explicit cast", 6, 8),
        finding("Field could be final", 3, 3),
    ])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    let cancel = CancellationToken::new();

    let outcome = service.inspect_document(&document, &cancel).await.unwrap();
    assert!(matches!(outcome, InspectionOutcome::Completed(_)));
    assert_eq!(lines(&outcome), vec![3, 6]);

    let describe = &outcome.inspections()[1];
    assert_eq!(describe.problem.position.relative_start_line, 1);
    assert_eq!(describe.problem.position.relative_end_line, 3);
    assert_eq!(describe.problem.position.code, "        if (animal instanceof Dog) {");

    let again = service.inspect_document(&document, &cancel).await.unwrap();
    assert!(matches!(again, InspectionOutcome::Cached(_)));
    assert_eq!(lines(&again), vec![3, 6]);
    assert_eq!(backend.inspection_calls(), 1);

    let requests = backend.requests.lock();
    let request = &requests[0];
    assert!(request.code.starts_with("/* 0 */ public class Pet {\n/* 1 */ \n"));
    assert!(request.existing.is_empty());
}

#[tokio::test]
async fn findings_follow_their_symbol_when_code_above_moves() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[finding("instanceof", 6, 6)])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    service
        .inspect_document(&document, &CancellationToken::new())
        .await
        .unwrap();

    let shifted = TextDocument::new("/w/src/Pet.java", 2, format!("import a.Dog;\n{PET}"));
    navigator.set(pet_symbols(1));
    let cached = service.cached(&shifted, None);
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].start_line(), 7);
}

#[tokio::test]
async fn editing_a_symbol_drops_only_its_findings() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[
        finding("instanceof", 6, 6),
        finding("final", 3, 3),
    ])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    service
        .inspect_document(&document, &CancellationToken::new())
        .await
        .unwrap();

    let edited = TextDocument::new("/w/src/Pet.java", 2, PET.replace("bark()", "woof()"));
    let describe = navigator.symbol("Pet.describe");
    assert!(service.cached(&edited, Some(&describe)).is_empty());
    assert!(!service.has_cached(&edited, Some(&describe)));

    let name = navigator.symbol("Pet.name");
    assert_eq!(service.cached(&edited, Some(&name)).len(), 1);
}

#[tokio::test]
async fn symbol_requests_send_only_the_symbol() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[
        finding("instanceof", 6, 6),
        finding("outside of the request", 3, 3),
    ])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    let describe = navigator.symbol("Pet.describe");

    let outcome = service
        .inspect_symbol(&document, &describe, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(lines(&outcome), vec![6]);

    let requests = backend.requests.lock();
    let request = &requests[0];
    assert!(request.code.starts_with("/* 5 */     public String describe"));
    assert!(request.code.ends_with("/* 10 */     }"));
}

#[tokio::test]
async fn tagged_responses_map_back_to_document_lines() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Tagged);
    backend.push_response(Ok("\
    public String describe(Object animal) {
        // @PROBLEM: Using instanceof with an explicit cast
        // @SOLUTION: Use pattern matching for instanceof
        // @INDICATOR: instanceof
        // @SEVERITY: MEDIUM
        if (animal instanceof Dog) {
            return ((Dog) animal).bark();
        }
        return \"\";
    }"
    .to_string()));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    let describe = navigator.symbol("Pet.describe");

    let outcome = service
        .inspect_symbol(&document, &describe, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(lines(&outcome), vec![6]);
    assert_eq!(outcome.inspections()[0].problem.indicator, "instanceof");
    assert_eq!(outcome.inspections()[0].problem.position.relative_start_line, 1);

    let requests = backend.requests.lock();
    let request = &requests[0];
    assert!(!request.code.contains("/*"));
    assert!(request.code.starts_with("    public String describe(Object animal) {"));
}

#[tokio::test]
async fn backend_failures_reach_the_caller_and_are_not_cached() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Err(AssistError::backend("503")));
    backend.push_response(Ok(json_response(&[finding("instanceof", 6, 6)])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    let cancel = CancellationToken::new();

    let err = service.inspect_document(&document, &cancel).await.unwrap_err();
    assert_eq!(err, AssistError::Backend("503".into()));
    assert!(service.cached(&document, None).is_empty());
    assert_eq!(service.in_flight(), 0);

    let outcome = service.inspect_document(&document, &cancel).await.unwrap();
    assert_eq!(lines(&outcome), vec![6]);
    assert_eq!(backend.inspection_calls(), 2);
}

#[tokio::test]
async fn a_fourth_document_is_rejected_while_three_run() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::holding(ResponseFormat::Json);
    let service = service(&navigator, &backend);

    let mut running = Vec::new();
    for name in ["A", "B", "C"] {
        let service = service.clone();
        let document = pet(&format!("/w/src/{name}.java"));
        running.push(tokio::spawn(async move {
            service
                .inspect_document(&document, &CancellationToken::new())
                .await
        }));
    }
    wait_for_in_flight(&service, 3).await;

    let cancel = CancellationToken::new();
    let fourth = service
        .inspect_document(&pet("/w/src/D.java"), &cancel)
        .await
        .unwrap();
    assert_eq!(
        fourth,
        InspectionOutcome::Busy(GateBusy::Global {
            in_flight: 3,
            limit: 3
        })
    );
    let same = service
        .inspect_document(&pet("/w/src/A.java"), &cancel)
        .await
        .unwrap();
    assert_eq!(
        same,
        InspectionOutcome::Busy(GateBusy::Key {
            key: "/w/src/A.java".into()
        })
    );

    backend.release(3);
    for task in running {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, InspectionOutcome::Completed(Vec::new()));
    }
    assert_eq!(service.in_flight(), 0);
}

#[tokio::test]
async fn cancelled_requests_store_nothing() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::holding(ResponseFormat::Json);
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");

    let cancel = CancellationToken::new();
    let pending = {
        let service = service.clone();
        let document = document.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { service.inspect_document(&document, &cancel).await })
    };
    wait_for_in_flight(&service, 1).await;

    cancel.cancel();
    assert_eq!(pending.await.unwrap(), Ok(InspectionOutcome::Cancelled));
    wait_for_in_flight(&service, 0).await;
    assert!(service.cached(&document, None).is_empty());
}

#[tokio::test]
async fn dispose_cancels_running_backend_calls() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::holding(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[finding("late", 3, 3)])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");

    let pending = {
        let service = service.clone();
        let document = document.clone();
        tokio::spawn(async move {
            service
                .inspect_document(&document, &CancellationToken::new())
                .await
        })
    };
    wait_for_in_flight(&service, 1).await;

    service.dispose();
    assert_eq!(pending.await.unwrap(), Ok(InspectionOutcome::Cancelled));
    wait_for_in_flight(&service, 0).await;
    assert!(service.cached(&document, None).is_empty());
}

#[tokio::test]
async fn responses_arriving_after_dispose_are_dropped() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::stubborn(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[finding("late", 3, 3)])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");

    let pending = {
        let service = service.clone();
        let document = document.clone();
        tokio::spawn(async move {
            service
                .inspect_document(&document, &CancellationToken::new())
                .await
        })
    };
    wait_for_in_flight(&service, 1).await;

    service.dispose();
    backend.release(1);
    assert_eq!(pending.await.unwrap(), Ok(InspectionOutcome::Cancelled));
    assert_eq!(service.in_flight(), 0);
    assert!(service.cached(&document, None).is_empty());
}

#[tokio::test]
async fn inspect_more_appends_to_existing_findings() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[finding("instanceof", 6, 6)])));
    backend.push_response(Ok(json_response(&[finding("string literal", 9, 9)])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    let cancel = CancellationToken::new();

    service.inspect_document(&document, &cancel).await.unwrap();
    let more = service.inspect_more(&document, &cancel).await.unwrap();
    assert_eq!(lines(&more), vec![9]);
    assert_eq!(backend.requests.lock()[1].existing.len(), 1);

    let all: Vec<u32> = service
        .cached(&document, None)
        .iter()
        .map(|i| i.start_line())
        .collect();
    assert_eq!(all, vec![6, 9]);
}

#[tokio::test]
async fn inspect_more_without_findings_inspects_the_document() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[finding("instanceof", 6, 6)])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");

    let outcome = service
        .inspect_more(&document, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(lines(&outcome), vec![6]);
    assert!(backend.requests.lock()[0].existing.is_empty());
}

#[tokio::test(start_paused = true)]
async fn debounced_requests_coalesce_into_one_call() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[finding("instanceof", 6, 6)])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    let cancel = CancellationToken::new();

    let (a, b, c) = tokio::join!(
        service.inspect_document_debounced(&document, &cancel),
        service.inspect_document_debounced(&document, &cancel),
        service.inspect_document_debounced(&document, &cancel),
    );
    let a = a.unwrap();
    assert_eq!(lines(&a), vec![6]);
    assert_eq!(b.unwrap(), a);
    assert_eq!(c.unwrap(), a);
    assert_eq!(backend.inspection_calls(), 1);
}

#[tokio::test]
async fn ignored_findings_are_hidden() {
    let navigator = FixedNavigator::with(pet_symbols(0));
    let backend = FakeBackend::new(ResponseFormat::Json);
    backend.push_response(Ok(json_response(&[
        finding("instanceof", 6, 6),
        finding("final", 3, 3),
    ])));
    let service = service(&navigator, &backend);
    let document = pet("/w/src/Pet.java");
    let outcome = service
        .inspect_document(&document, &CancellationToken::new())
        .await
        .unwrap();

    let id = outcome.inspections()[0].id;
    assert_eq!(service.ignore(&document, None, Some(id)), 1);
    assert_eq!(service.ignore(&document, None, Some(id)), 0);
    let remaining: Vec<u32> = service
        .cached(&document, None)
        .iter()
        .map(|i| i.start_line())
        .collect();
    assert_eq!(remaining, vec![6]);

    service.invalidate(Some(&document), None, None);
    assert!(service.cached(&document, None).is_empty());
}

#[tokio::test]
async fn documents_without_symbols_are_not_sent() {
    let navigator = FixedNavigator::with(Vec::new());
    let backend = FakeBackend::new(ResponseFormat::Json);
    let service = service(&navigator, &backend);

    let outcome = service
        .inspect_document(&pet("/w/src/Pet.java"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, InspectionOutcome::NothingToInspect);
    assert_eq!(backend.inspection_calls(), 0);
}
