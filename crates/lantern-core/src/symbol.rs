use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{Range, TextDocument};

/// Kind of a document symbol, as reported by the navigation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Enum,
    Record,
    Method,
    Constructor,
    Field,
    Other,
}

impl SymbolKind {
    /// Methods and constructors own every line of their body; other symbols are anchored to
    /// their first line.
    pub fn is_method_like(self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Constructor)
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum | SymbolKind::Record
        )
    }
}

/// A symbol with its fully qualified name (`Outer.Inner.method`) and source range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub range: Range,
}

impl SymbolInfo {
    pub fn new(qualified_name: impl Into<String>, kind: SymbolKind, range: Range) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            kind,
            range,
        }
    }

    /// Simple (unqualified) name of the symbol.
    pub fn name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

impl fmt::Display for SymbolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.qualified_name)
    }
}

/// Symbol tree provider.
///
/// Implemented by the editor integration; Lantern never parses source code itself.
pub trait SymbolNavigator: Send + Sync {
    /// Lists every class, method and field symbol of `document`, flattened, in document order.
    fn list_symbols(&self, document: &TextDocument) -> Vec<SymbolInfo>;

    /// Returns `true` if `inner` is nested within `outer`.
    fn range_contains(&self, outer: &Range, inner: &Range) -> bool {
        outer.contains_range(inner)
    }
}

/// Process-unique identifier of a derived result (e.g. one inspection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(u64);

impl ResultId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
