//! Per-document cache of derived results keyed by symbol snapshot.
//!
//! Layout: `document -> qualified symbol name -> (snapshot id, results)`.
//!
//! A cached entry is only surfaced while the symbol's current text hashes to the stored
//! [`SnapshotId`]. Results store positions relative to the start of their symbol and are
//! re-anchored on every read, so they follow the symbol when code above it is edited.
//!
//! Every operation is a plain in-memory map operation: nothing here suspends or fails.

use std::collections::HashMap;
use std::sync::Arc;

use lantern_core::{DocumentKey, ResultId, SymbolInfo, SymbolNavigator, TextDocument};
use parking_lot::Mutex;
use serde::Serialize;

use crate::SnapshotId;

/// A result derived from a symbol's text (for example an inspection).
pub trait DerivedResult: Clone + Send + Sync + 'static {
    fn id(&self) -> ResultId;

    /// Projects the stored relative position onto the symbol's current start line.
    fn anchor_to(&mut self, symbol_start_line: u32);
}

#[derive(Debug, Clone)]
struct StoredResult<R> {
    result: R,
    ignored: bool,
}

#[derive(Debug)]
struct SymbolEntry<R> {
    snapshot: SnapshotId,
    results: Vec<StoredResult<R>>,
}

type SymbolEntries<R> = HashMap<String, SymbolEntry<R>>;

/// Counters describing the current contents of a [`SnapshotKeyedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SnapshotCacheStats {
    pub documents: usize,
    pub symbols: usize,
    pub results: usize,
    pub ignored: usize,
}

pub struct SnapshotKeyedCache<R> {
    navigator: Arc<dyn SymbolNavigator>,
    documents: Mutex<HashMap<DocumentKey, SymbolEntries<R>>>,
}

impl<R: DerivedResult> SnapshotKeyedCache<R> {
    pub fn new(navigator: Arc<dyn SymbolNavigator>) -> Self {
        Self {
            navigator,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if at least one non-ignored, snapshot-valid result exists for `symbol`
    /// (or any symbol nested in it), or for the whole document when `symbol` is `None`.
    pub fn has_valid_entries(&self, document: &TextDocument, symbol: Option<&SymbolInfo>) -> bool {
        let symbols = self.scope(document, symbol, true);
        let documents = self.documents.lock();
        let Some(entries) = documents.get(document.key()) else {
            return false;
        };
        symbols.iter().any(|s| {
            valid_entry(entries, document, s)
                .is_some_and(|entry| entry.results.iter().any(|r| !r.ignored))
        })
    }

    /// Returns the non-ignored results whose symbol snapshot is still current.
    ///
    /// Without `symbol`, every symbol of the document is visited. With `include_contained`,
    /// symbols whose range is nested within `symbol` contribute too.
    pub fn get_valid(
        &self,
        document: &TextDocument,
        symbol: Option<&SymbolInfo>,
        include_contained: bool,
    ) -> Vec<R> {
        let symbols = self.scope(document, symbol, include_contained);
        let documents = self.documents.lock();
        let Some(entries) = documents.get(document.key()) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for s in &symbols {
            match valid_entry(entries, document, s) {
                Some(entry) => {
                    tracing::debug!(
                        target = "lantern.cache",
                        document = %document.key(),
                        symbol = %s,
                        "snapshot cache hit"
                    );
                    out.extend(entry.results.iter().filter(|r| !r.ignored).map(|r| {
                        let mut result = r.result.clone();
                        result.anchor_to(s.range.start.line);
                        result
                    }));
                }
                None => {
                    tracing::trace!(
                        target = "lantern.cache",
                        document = %document.key(),
                        symbol = %s,
                        "snapshot cache miss"
                    );
                }
            }
        }
        out
    }

    /// Stores `results` for `symbol` under its current snapshot.
    ///
    /// With `append`, results are added to an existing entry whose snapshot still matches;
    /// otherwise the entry is replaced.
    pub fn store(&self, document: &TextDocument, symbol: &SymbolInfo, results: Vec<R>, append: bool) {
        let snapshot = SnapshotId::of(document.text_in_range(&symbol.range));
        tracing::debug!(
            target = "lantern.cache",
            document = %document.key(),
            symbol = %symbol,
            count = results.len(),
            append,
            "caching derived results"
        );

        let stored = results.into_iter().map(|result| StoredResult {
            result,
            ignored: false,
        });

        let mut documents = self.documents.lock();
        let entries = documents.entry(document.key().clone()).or_default();
        match entries.get_mut(&symbol.qualified_name) {
            Some(entry) if append && entry.snapshot == snapshot => entry.results.extend(stored),
            _ => {
                entries.insert(
                    symbol.qualified_name.clone(),
                    SymbolEntry {
                        snapshot,
                        results: stored.collect(),
                    },
                );
            }
        }
    }

    /// Dispatching form of the invalidation operations.
    ///
    /// - no document: everything
    /// - document only: that document
    /// - document + symbol: that symbol and every symbol nested under its qualified name
    /// - document + symbol + entry: that single result
    pub fn invalidate(
        &self,
        document: Option<&TextDocument>,
        symbol: Option<&SymbolInfo>,
        entry: Option<ResultId>,
    ) {
        match (document, symbol, entry) {
            (None, _, _) => self.clear(),
            (Some(document), None, _) => self.invalidate_document(document.key()),
            (Some(document), Some(symbol), None) => {
                self.invalidate_symbol(document.key(), &symbol.qualified_name)
            }
            (Some(document), Some(symbol), Some(id)) => {
                self.remove_result(document, symbol, id);
            }
        }
    }

    pub fn clear(&self) {
        self.documents.lock().clear();
    }

    pub fn invalidate_document(&self, document: &DocumentKey) {
        if self.documents.lock().remove(document).is_some() {
            tracing::debug!(target = "lantern.cache", document = %document, "invalidated document");
        }
    }

    /// Removes `qualified_name` and every entry nested under it.
    ///
    /// Nested names must continue with a `.` right after the prefix, so invalidating
    /// `Account` leaves `AccountManager` alone.
    pub fn invalidate_symbol(&self, document: &DocumentKey, qualified_name: &str) {
        let mut documents = self.documents.lock();
        let Some(entries) = documents.get_mut(document) else {
            return;
        };
        let before = entries.len();
        entries.retain(|name, _| !is_same_or_nested(name, qualified_name));
        tracing::debug!(
            target = "lantern.cache",
            document = %document,
            symbol = qualified_name,
            removed = before - entries.len(),
            "invalidated symbol"
        );
    }

    /// Removes a single result of `symbol`, provided the symbol's snapshot is still current.
    pub fn remove_result(&self, document: &TextDocument, symbol: &SymbolInfo, id: ResultId) -> bool {
        let snapshot = SnapshotId::of(document.text_in_range(&symbol.range));
        let mut documents = self.documents.lock();
        let Some(entry) = documents
            .get_mut(document.key())
            .and_then(|entries| entries.get_mut(&symbol.qualified_name))
        else {
            return false;
        };
        if entry.snapshot != snapshot {
            return false;
        }
        let before = entry.results.len();
        entry.results.retain(|r| r.result.id() != id);
        before != entry.results.len()
    }

    /// Marks results as ignored without removing them.
    ///
    /// Without `symbol`, every currently valid result of the document is ignored; with
    /// `symbol`, the results of that symbol and its nested symbols; with `entry`, only the
    /// result with that id. Returns how many results were newly ignored.
    pub fn mark_ignored(
        &self,
        document: &TextDocument,
        symbol: Option<&SymbolInfo>,
        entry: Option<ResultId>,
    ) -> usize {
        let symbols = self.scope(document, symbol, true);
        let mut documents = self.documents.lock();
        let Some(entries) = documents.get_mut(document.key()) else {
            return 0;
        };

        let mut ignored = 0;
        for s in &symbols {
            let Some(cached) = entries.get_mut(&s.qualified_name) else {
                continue;
            };
            if cached.snapshot != SnapshotId::of(document.text_in_range(&s.range)) {
                continue;
            }
            for stored in cached.results.iter_mut() {
                if stored.ignored || entry.is_some_and(|id| stored.result.id() != id) {
                    continue;
                }
                stored.ignored = true;
                ignored += 1;
            }
        }
        ignored
    }

    pub fn stats(&self) -> SnapshotCacheStats {
        let documents = self.documents.lock();
        let mut stats = SnapshotCacheStats {
            documents: documents.len(),
            ..SnapshotCacheStats::default()
        };
        for entries in documents.values() {
            stats.symbols += entries.len();
            for entry in entries.values() {
                stats.results += entry.results.len();
                stats.ignored += entry.results.iter().filter(|r| r.ignored).count();
            }
        }
        stats
    }

    fn scope(
        &self,
        document: &TextDocument,
        symbol: Option<&SymbolInfo>,
        include_contained: bool,
    ) -> Vec<SymbolInfo> {
        match symbol {
            None => self.navigator.list_symbols(document),
            Some(symbol) if include_contained => {
                let mut contained: Vec<SymbolInfo> = self
                    .navigator
                    .list_symbols(document)
                    .into_iter()
                    .filter(|candidate| self.navigator.range_contains(&symbol.range, &candidate.range))
                    .collect();
                if !contained
                    .iter()
                    .any(|s| s.qualified_name == symbol.qualified_name)
                {
                    contained.insert(0, symbol.clone());
                }
                contained
            }
            Some(symbol) => vec![symbol.clone()],
        }
    }
}

fn valid_entry<'a, R>(
    entries: &'a SymbolEntries<R>,
    document: &TextDocument,
    symbol: &SymbolInfo,
) -> Option<&'a SymbolEntry<R>> {
    let entry = entries.get(&symbol.qualified_name)?;
    (entry.snapshot == SnapshotId::of(document.text_in_range(&symbol.range))).then_some(entry)
}

fn is_same_or_nested(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}
