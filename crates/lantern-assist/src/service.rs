use std::sync::Arc;
use std::time::Duration;

use lantern_cache::SnapshotKeyedCache;
use lantern_core::{DocumentKey, Range, ResultId, SymbolInfo, SymbolNavigator, TextDocument};
use lantern_scheduler::{
    run_cancellable, Cancelled, CoalescingGate, GateBusy, GateSettings, KeyedCoalescer,
};
use tokio_util::sync::CancellationToken;

use crate::locate::{locate_and_store, target_symbols};
use crate::parse::{code_only, number_lines, parse_json_findings, parse_tagged_findings};
use crate::{AssistBackend, AssistError, Inspection, InspectionRequest, ResponseFormat};

pub type InspectionCache = SnapshotKeyedCache<Inspection>;

/// Result of an inspection request.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectionOutcome {
    /// Fresh findings from the backend (possibly none).
    Completed(Vec<Inspection>),
    /// Findings served from the cache; the backend was not asked.
    Cached(Vec<Inspection>),
    /// The request was rejected; nothing was sent.
    Busy(GateBusy),
    Cancelled,
    /// The requested range covers no symbol.
    NothingToInspect,
}

impl InspectionOutcome {
    pub fn inspections(&self) -> &[Inspection] {
        match self {
            InspectionOutcome::Completed(found) | InspectionOutcome::Cached(found) => found,
            _ => &[],
        }
    }

    pub fn into_inspections(self) -> Vec<Inspection> {
        match self {
            InspectionOutcome::Completed(found) | InspectionOutcome::Cached(found) => found,
            _ => Vec::new(),
        }
    }
}

struct ServiceInner {
    cache: Arc<InspectionCache>,
    navigator: Arc<dyn SymbolNavigator>,
    backend: Arc<dyn AssistBackend>,
    gate: CoalescingGate<DocumentKey>,
    coalescer: KeyedCoalescer<DocumentKey, InspectionOutcome, AssistError>,
    debounce_wait: Duration,
    shutdown: CancellationToken,
}

/// Code inspections over documents and symbols, backed by the snapshot-keyed cache.
///
/// Backend calls are admitted through a [`CoalescingGate`] keyed by document: one request
/// per document at a time and a global concurrency cap. Rejections are reported as
/// [`InspectionOutcome::Busy`], never queued.
#[derive(Clone)]
pub struct InspectionService {
    inner: Arc<ServiceInner>,
}

impl InspectionService {
    pub fn new(
        cache: Arc<InspectionCache>,
        navigator: Arc<dyn SymbolNavigator>,
        backend: Arc<dyn AssistBackend>,
        gate: GateSettings,
        debounce_wait: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                cache,
                navigator,
                backend,
                gate: CoalescingGate::new(gate),
                coalescer: KeyedCoalescer::new(),
                debounce_wait,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<InspectionCache> {
        &self.inner.cache
    }

    pub fn in_flight(&self) -> usize {
        self.inner.gate.in_flight()
    }

    pub async fn inspect_symbol(
        &self,
        document: &TextDocument,
        symbol: &SymbolInfo,
        cancel: &CancellationToken,
    ) -> Result<InspectionOutcome, AssistError> {
        let cached = self.inner.cache.get_valid(document, Some(symbol), true);
        if !cached.is_empty() {
            return Ok(InspectionOutcome::Cached(sorted(cached)));
        }
        let range = Range::lines(symbol.range.start.line, symbol.range.end.line);
        self.request(document, range, Vec::new(), false, cancel).await
    }

    pub async fn inspect_document(
        &self,
        document: &TextDocument,
        cancel: &CancellationToken,
    ) -> Result<InspectionOutcome, AssistError> {
        let cached = self.inner.cache.get_valid(document, None, false);
        if !cached.is_empty() {
            return Ok(InspectionOutcome::Cached(sorted(cached)));
        }
        self.request(document, document.full_range(), Vec::new(), false, cancel)
            .await
    }

    /// Asks for findings beyond the ones already cached and appends them.
    pub async fn inspect_more(
        &self,
        document: &TextDocument,
        cancel: &CancellationToken,
    ) -> Result<InspectionOutcome, AssistError> {
        let existing = self.inner.cache.get_valid(document, None, false);
        if existing.is_empty() {
            return self.inspect_document(document, cancel).await;
        }
        self.request(document, document.full_range(), existing, true, cancel)
            .await
    }

    /// Document inspection that only runs once edits settle for `debounce_wait`.
    ///
    /// Calls for the same document replace each other's pending request; every caller in
    /// the slot receives the result of the last one.
    pub async fn inspect_document_debounced(
        &self,
        document: &TextDocument,
        cancel: &CancellationToken,
    ) -> Result<InspectionOutcome, AssistError> {
        let service = self.clone();
        let latest = document.clone();
        let operation = move || async move {
            let shutdown = service.inner.shutdown.clone();
            service.inspect_document(&latest, &shutdown).await
        };
        let pending = self.inner.coalescer.debounce(
            document.key().clone(),
            self.inner.debounce_wait,
            operation,
        );
        match run_cancellable(cancel, pending).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(AssistError::Cancelled)) | Err(Cancelled) => Ok(InspectionOutcome::Cancelled),
            Ok(Err(err)) => Err(err),
        }
    }

    /// Cached findings of `symbol` (and the symbols nested in it), or of the whole document.
    pub fn cached(&self, document: &TextDocument, symbol: Option<&SymbolInfo>) -> Vec<Inspection> {
        sorted(self.inner.cache.get_valid(document, symbol, true))
    }

    pub fn has_cached(&self, document: &TextDocument, symbol: Option<&SymbolInfo>) -> bool {
        self.inner.cache.has_valid_entries(document, symbol)
    }

    /// Hides findings from future reads. Returns how many were newly ignored.
    pub fn ignore(
        &self,
        document: &TextDocument,
        symbol: Option<&SymbolInfo>,
        inspection: Option<ResultId>,
    ) -> usize {
        let ignored = self.inner.cache.mark_ignored(document, symbol, inspection);
        tracing::debug!(
            target = "lantern.assist",
            document = %document.key(),
            ignored,
            "ignored inspections"
        );
        ignored
    }

    pub fn invalidate(
        &self,
        document: Option<&TextDocument>,
        symbol: Option<&SymbolInfo>,
        inspection: Option<ResultId>,
    ) {
        self.inner.cache.invalidate(document, symbol, inspection);
    }

    /// Cancels pending debounced requests and signals in-flight backend calls.
    ///
    /// Responses arriving afterwards are dropped instead of stored.
    pub fn dispose(&self) {
        self.inner.coalescer.cancel_all();
        self.inner.shutdown.cancel();
    }

    async fn request(
        &self,
        document: &TextDocument,
        range: Range,
        existing: Vec<Inspection>,
        append: bool,
        cancel: &CancellationToken,
    ) -> Result<InspectionOutcome, AssistError> {
        let inner = &self.inner;
        let all = inner.navigator.list_symbols(document);
        let symbols = target_symbols(&all, &range, inner.navigator.as_ref());
        let Some(span) = symbols
            .iter()
            .map(|symbol| symbol.range)
            .reduce(|acc, next| acc.union(&next))
        else {
            tracing::debug!(
                target = "lantern.assist",
                document = %document.key(),
                "no symbols to inspect"
            );
            return Ok(InspectionOutcome::NothingToInspect);
        };

        let permit = match inner.gate.try_acquire(document.key().clone()) {
            Ok(permit) => permit,
            Err(busy) => {
                tracing::warn!(
                    target = "lantern.assist",
                    document = %document.key(),
                    reason = %busy,
                    "inspection rejected"
                );
                return Ok(InspectionOutcome::Busy(busy));
            }
        };

        let format = inner.backend.response_format();
        let (first, last) = (span.start.line, span.end.line);
        let request = InspectionRequest {
            path: document.path().to_path_buf(),
            code: request_code(document, first, last, format),
            existing,
        };

        let cache = Arc::clone(&inner.cache);
        let backend = Arc::clone(&inner.backend);
        let snapshot = document.clone();
        let shutdown = inner.shutdown.clone();
        let backend_cancel = link_cancellation(cancel, &shutdown);
        // The task owns the permit; a caller that gives up does not free the slot early.
        let task = tokio::spawn(async move {
            let _permit = permit;
            let _linked = backend_cancel.clone().drop_guard();
            let raw = backend.run_inspection(request, backend_cancel).await?;
            if shutdown.is_cancelled() {
                return Err(AssistError::Cancelled);
            }
            let parsed = parse_response(&snapshot, first, last, format, &raw);
            tracing::debug!(
                target = "lantern.assist",
                document = %snapshot.key(),
                parsed = parsed.len(),
                "inspection response parsed"
            );
            Ok::<_, AssistError>(locate_and_store(&cache, &snapshot, &symbols, parsed, append))
        });

        match run_cancellable(cancel, task).await {
            Err(Cancelled) | Ok(Ok(Err(AssistError::Cancelled))) => {
                tracing::debug!(
                    target = "lantern.assist",
                    document = %document.key(),
                    "inspection cancelled"
                );
                Ok(InspectionOutcome::Cancelled)
            }
            Ok(Ok(Ok(found))) => Ok(InspectionOutcome::Completed(found)),
            Ok(Ok(Err(err))) => {
                tracing::warn!(
                    target = "lantern.assist",
                    document = %document.key(),
                    error = %err,
                    "inspection failed"
                );
                Err(err)
            }
            Ok(Err(join_err)) => {
                tracing::error!(
                    target = "lantern.assist",
                    document = %document.key(),
                    error = %join_err,
                    "inspection task failed"
                );
                Err(AssistError::backend(join_err))
            }
        }
    }
}

/// Token fired by either the caller's token or `shutdown`.
///
/// The returned token is a child of `shutdown`; the forwarding task exits once it fires.
fn link_cancellation(caller: &CancellationToken, shutdown: &CancellationToken) -> CancellationToken {
    let linked = shutdown.child_token();
    let forward = linked.clone();
    let caller = caller.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = caller.cancelled() => forward.cancel(),
            _ = forward.cancelled() => {}
        }
    });
    linked
}

fn sorted(mut inspections: Vec<Inspection>) -> Vec<Inspection> {
    inspections.sort_by_key(|inspection| inspection.start_line());
    inspections
}

fn request_code(document: &TextDocument, first: u32, last: u32, format: ResponseFormat) -> String {
    match format {
        ResponseFormat::Json => number_lines(
            (first..=last).filter_map(|line| document.line(line).map(|text| (line, text))),
        ),
        ResponseFormat::Tagged => code_only(document.text_in_range(&Range::lines(first, last))),
    }
}

fn parse_response(
    document: &TextDocument,
    first: u32,
    last: u32,
    format: ResponseFormat,
    raw: &str,
) -> Vec<Inspection> {
    match format {
        ResponseFormat::Json => {
            let lines: Vec<&str> = (0..document.line_count())
                .map_while(|line| document.line(line))
                .collect();
            parse_json_findings(raw, &lines)
                .into_iter()
                .filter(|inspection| (first..=last).contains(&inspection.start_line()))
                .collect()
        }
        ResponseFormat::Tagged => {
            let original = document.text_in_range(&Range::lines(first, last));
            let mut found = parse_tagged_findings(raw, original);
            for inspection in &mut found {
                let position = &mut inspection.problem.position;
                position.start_line += first;
                position.end_line += first;
            }
            found
        }
    }
}
