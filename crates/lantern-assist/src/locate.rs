//! Assigning parsed findings to the symbols they describe.

use lantern_cache::SnapshotKeyedCache;
use lantern_core::{Range, SymbolInfo, SymbolNavigator, TextDocument};

use crate::Inspection;

/// Symbols a request over `range` covers.
///
/// Types fully inside the range and every other symbol overlapping it. When the range is
/// smaller than any of those (a caret inside a field initializer, say), the innermost type
/// enclosing it is used instead.
pub fn target_symbols(
    all: &[SymbolInfo],
    range: &Range,
    navigator: &dyn SymbolNavigator,
) -> Vec<SymbolInfo> {
    let targets: Vec<SymbolInfo> = all
        .iter()
        .filter(|symbol| {
            if symbol.kind.is_type() {
                navigator.range_contains(range, &symbol.range)
            } else {
                symbol.range.intersects_lines(range)
            }
        })
        .cloned()
        .collect();
    if !targets.is_empty() {
        return targets;
    }

    all.iter()
        .filter(|symbol| symbol.kind.is_type() && navigator.range_contains(&symbol.range, range))
        .min_by_key(|symbol| symbol.range.end.line - symbol.range.start.line)
        .cloned()
        .into_iter()
        .collect()
}

/// Index of the first symbol owning `line`.
fn owner(symbols: &[SymbolInfo], line: u32) -> Option<usize> {
    symbols.iter().position(|symbol| {
        if symbol.kind.is_method_like() {
            symbol.range.contains_line(line)
        } else {
            symbol.range.start.line == line
        }
    })
}

/// Attaches each finding to its symbol, computes relative lines and stores the result.
///
/// Without `append`, previous entries of every symbol in `symbols` are replaced, even by an
/// empty list. Returns the located findings sorted by line.
pub fn locate_and_store(
    cache: &SnapshotKeyedCache<Inspection>,
    document: &TextDocument,
    symbols: &[SymbolInfo],
    inspections: Vec<Inspection>,
    append: bool,
) -> Vec<Inspection> {
    let mut per_symbol: Vec<Vec<Inspection>> = vec![Vec::new(); symbols.len()];
    for mut inspection in inspections {
        let line = inspection.start_line();
        let Some(index) = owner(symbols, line) else {
            tracing::warn!(
                target = "lantern.assist",
                document = %document.key(),
                line,
                problem = %inspection.problem.description,
                "could not locate symbol for finding"
            );
            continue;
        };

        let base = symbols[index].range.start.line;
        let position = &mut inspection.problem.position;
        position.relative_start_line = position.start_line - base;
        position.relative_end_line = position.end_line.max(position.start_line) - base;
        per_symbol[index].push(inspection);
    }

    let mut located = Vec::new();
    for (symbol, found) in symbols.iter().zip(per_symbol) {
        if found.is_empty() && append {
            continue;
        }
        located.extend(found.iter().cloned());
        cache.store(document, symbol, found, append);
    }
    located.sort_by_key(|inspection| inspection.start_line());
    located
}
