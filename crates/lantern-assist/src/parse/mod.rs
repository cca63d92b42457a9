//! Parsers for raw backend inspection responses.
//!
//! Both parsers are total: malformed findings are logged and dropped, never fatal.

mod json;
mod tagged;

pub use json::parse_json_findings;
pub use tagged::parse_tagged_findings;

/// Which grammar a backend answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// A JSON array of `{problem: {position: {startLine, endLine}, description}, solution}`.
    #[default]
    Json,
    /// The code echoed back with four `// @TAG:` comment lines before each finding.
    Tagged,
}

/// Calls `each(original_index, line)` for every line that carries code: not blank, not a `//`
/// comment, not inside a `/* ... */` block.
pub(crate) fn for_each_code_line<'a>(lines: &[&'a str], mut each: impl FnMut(usize, &'a str)) {
    let mut in_block_comment = false;
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("/*") {
            in_block_comment = true;
        }
        if !trimmed.is_empty() && !in_block_comment && !trimmed.starts_with("//") {
            each(index, line);
        }
        if trimmed.ends_with("*/") {
            in_block_comment = false;
        }
    }
}

/// `text` without blank and comment lines, the form sent to tagged-grammar backends.
pub fn code_only(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::new();
    for_each_code_line(&lines, |_, line| out.push(line));
    out.join("\n")
}

/// Prefixes each line of `lines` with its zero-based document line number as a block comment
/// (`/* 12 */ ...`), the form sent to JSON-grammar backends.
pub fn number_lines<'a>(lines: impl IntoIterator<Item = (u32, &'a str)>) -> String {
    lines
        .into_iter()
        .map(|(index, line)| format!("/* {index} */ {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
