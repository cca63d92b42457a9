//! Core shared types for Lantern.
//!
//! This crate is intentionally small: positions, ranges, text documents and the symbol model
//! consumed from the editor's navigation service.

mod symbol;
mod text;

pub use symbol::{ResultId, SymbolInfo, SymbolKind, SymbolNavigator};
pub use text::{DocumentKey, LineIndex, TextDocument};

use serde::{Deserialize, Serialize};

/// A position in a text document expressed as (line, character offset).
///
/// Both components are zero-based. `character` counts Unicode scalar values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A range in a text document. Containment checks are inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[inline]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range spanning whole lines `start_line..=end_line`.
    pub const fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start: Position::new(start_line, 0),
            end: Position::new(end_line, u32::MAX),
        }
    }

    /// Returns `true` if `other` lies completely within `self` (inclusive bounds).
    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns `true` if `line` is within `start.line..=end.line`.
    pub fn contains_line(&self, line: u32) -> bool {
        self.start.line <= line && line <= self.end.line
    }

    /// Returns `true` if the two ranges share at least one line.
    pub fn intersects_lines(&self, other: &Range) -> bool {
        self.start.line <= other.end.line && other.start.line <= self.end.line
    }

    /// Smallest range covering both `self` and `other`.
    pub fn union(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}
