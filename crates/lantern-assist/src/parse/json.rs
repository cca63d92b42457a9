use serde_json::Value;

use crate::{Inspection, ProblemPosition, Severity};

/// Removes markdown fences and a trailing `//END`-style mark line.
fn strip_envelope(response: &str) -> &str {
    let mut body = response.trim();
    if let Some((head, last)) = body.rsplit_once('\n') {
        if last.trim_start().starts_with("//") {
            body = head.trim_end();
        }
    } else if body.starts_with("//") {
        return "";
    }
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the fence line, including an optional language tag.
        body = rest.split_once('\n').map_or("", |(_, rest)| rest);
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

fn line_number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> Option<&str> {
    value?.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn is_code(line: &str, in_block_comment: bool) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !in_block_comment && !trimmed.starts_with("//")
}

/// First code line at or after `start`.
fn shrink_start(lines: &[&str], start: u32) -> Option<u32> {
    let mut in_block_comment = false;
    for (index, line) in lines.iter().enumerate().skip(start as usize) {
        let trimmed = line.trim();
        if trimmed.starts_with("/*") {
            in_block_comment = true;
        }
        if trimmed.ends_with("*/") {
            in_block_comment = false;
        }
        if is_code(line, in_block_comment) {
            return Some(index as u32);
        }
    }
    None
}

/// Last code line at or before `end`.
fn shrink_end(lines: &[&str], end: u32) -> Option<u32> {
    let end = (end as usize).min(lines.len().checked_sub(1)?);
    let mut in_block_comment = false;
    for index in (0..=end).rev() {
        let trimmed = lines[index].trim();
        if trimmed.ends_with("*/") {
            in_block_comment = true;
        }
        if trimmed.starts_with("/*") {
            in_block_comment = false;
        }
        if is_code(lines[index], in_block_comment) {
            return Some(index as u32);
        }
    }
    None
}

/// Parses a JSON-grammar response. Line numbers in the response are absolute lines of
/// `document_lines`.
pub fn parse_json_findings(response: &str, document_lines: &[&str]) -> Vec<Inspection> {
    let body = strip_envelope(response);
    if body.is_empty() {
        return Vec::new();
    }
    let items = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            tracing::warn!(
                target = "lantern.assist",
                "inspection response is not a JSON array"
            );
            return Vec::new();
        }
        Err(err) => {
            tracing::warn!(
                target = "lantern.assist",
                error = %err,
                "failed to parse inspection response"
            );
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for item in &items {
        let problem = item.get("problem");
        let position = problem.and_then(|p| p.get("position"));
        let start = line_number(position.and_then(|p| p.get("startLine")));
        let description = text(problem.and_then(|p| p.get("description")));
        let solution = text(item.get("solution"));
        let (Some(start), Some(description), Some(solution)) = (start, description, solution) else {
            tracing::warn!(target = "lantern.assist", item = %item, "dropping invalid inspection");
            continue;
        };
        let end = line_number(position.and_then(|p| p.get("endLine")))
            .unwrap_or(start)
            .max(start);

        let start_line = shrink_start(document_lines, start).filter(|&s| s <= end).unwrap_or(start);
        let end_line = shrink_end(document_lines, end)
            .filter(|&e| e >= start_line)
            .unwrap_or(start_line);

        let mut inspection = Inspection::new(description, solution, start_line, end_line);
        if let Some(indicator) = text(problem.and_then(|p| p.get("indicator"))) {
            inspection.problem.indicator = indicator.to_owned();
        }
        if let Some(severity) = text(item.get("severity")) {
            inspection.severity = Severity::parse(severity);
        }
        inspection.problem.position = ProblemPosition {
            start_line,
            end_line,
            relative_start_line: start_line,
            relative_end_line: end_line,
            code: document_lines
                .get(start_line as usize)
                .map(|line| (*line).to_owned())
                .unwrap_or_default(),
        };
        out.push(inspection);
    }
    out.sort_by_key(|inspection| inspection.start_line());
    out
}
