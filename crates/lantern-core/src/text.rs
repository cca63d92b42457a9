use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Position, Range};

/// Stable, path-like identity of a document.
///
/// Documents are keyed by their filesystem path so that a document reopened in a new editor
/// tab maps to the same cache scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Byte offsets of line starts for a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    pub fn line_start(&self, line: u32) -> Option<usize> {
        self.line_starts.get(line as usize).copied()
    }

    /// End of `line` (exclusive), not including the line terminator.
    fn line_end(&self, text: &str, line: u32) -> Option<usize> {
        let start = self.line_start(line)?;
        let mut end = self
            .line_starts
            .get(line as usize + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        if end > start && text.as_bytes().get(end - 1) == Some(&b'\r') {
            end -= 1;
        }
        Some(end)
    }

    /// Converts `position` into a byte offset, clamping to the end of its line (and the end of
    /// the text for lines past the end).
    pub fn offset(&self, text: &str, position: Position) -> usize {
        let Some(start) = self.line_start(position.line) else {
            return self.len;
        };
        let end = self.line_end(text, position.line).unwrap_or(self.len);
        let line = &text[start..end];
        let within = line
            .char_indices()
            .nth(position.character as usize)
            .map(|(idx, _)| idx)
            .unwrap_or(line.len());
        start + within
    }
}

/// An in-memory snapshot of an editor document.
#[derive(Debug, Clone)]
pub struct TextDocument {
    path: PathBuf,
    key: DocumentKey,
    version: i32,
    text: String,
    line_index: LineIndex,
}

impl TextDocument {
    pub fn new(path: impl Into<PathBuf>, version: i32, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        Self {
            key: DocumentKey::from_path(&path),
            line_index: LineIndex::new(&text),
            path,
            version,
            text,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> u32 {
        self.line_index.line_count()
    }

    /// Returns the exact text covered by `range`.
    ///
    /// Out-of-bounds positions are clamped, so this never panics.
    pub fn text_in_range(&self, range: &Range) -> &str {
        let start = self.line_index.offset(&self.text, range.start);
        let end = self.line_index.offset(&self.text, range.end).max(start);
        &self.text[start..end]
    }

    /// Returns the text of a single line without its terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        let start = self.line_index.line_start(line)?;
        let end = self.line_index.line_end(&self.text, line)?;
        Some(&self.text[start..end])
    }

    /// Range covering the whole document.
    pub fn full_range(&self) -> Range {
        let last = self.line_count().saturating_sub(1);
        Range::lines(0, last)
    }

    /// Replaces the document contents, bumping the version.
    pub fn apply_full_change(&mut self, version: i32, text: impl Into<String>) {
        self.text = text.into();
        self.line_index = LineIndex::new(&self.text);
        self.version = version;
    }
}
