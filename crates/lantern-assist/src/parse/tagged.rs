use std::sync::OnceLock;

use regex::Regex;

use crate::parse::for_each_code_line;
use crate::{Inspection, ProblemPosition, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Problem,
    Solution,
    Indicator,
    Severity,
}

fn tag_line(line: &str) -> Option<(Tag, &str)> {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| {
        Regex::new(r"^\s*//\s*@(PROBLEM|SOLUTION|INDICATOR|SYMBOL|SEVERITY):(.*)$")
            .expect("tag regex should compile")
    });
    let captures = re.captures(line)?;
    let tag = match captures.get(1)?.as_str() {
        "PROBLEM" => Tag::Problem,
        "SOLUTION" => Tag::Solution,
        "INDICATOR" | "SYMBOL" => Tag::Indicator,
        _ => Tag::Severity,
    };
    Some((tag, captures.get(2).map_or("", |m| m.as_str()).trim()))
}

/// Parses a tagged-grammar response.
///
/// `original` is the text the response was produced from, before comment stripping. Lines of
/// the returned inspections are relative to its first line.
pub fn parse_tagged_findings(response: &str, original: &str) -> Vec<Inspection> {
    let lines: Vec<&str> = response.lines().filter(|line| !line.trim().is_empty()).collect();

    // (index among the response's code lines, inspection)
    let mut found: Vec<(usize, Inspection)> = Vec::new();
    let mut tag_lines = 0;
    let mut i = 0;
    while i < lines.len() {
        let Some((Tag::Problem, description)) = tag_line(lines[i]) else {
            i += 1;
            continue;
        };

        let rest: Vec<Option<(Tag, &str)>> =
            (1..4).map(|k| lines.get(i + k).and_then(|l| tag_line(l))).collect();
        match rest.as_slice() {
            [Some((Tag::Solution, solution)), Some((Tag::Indicator, indicator)), Some((Tag::Severity, severity))] =>
            {
                let code_index = i - tag_lines;
                tag_lines += 4;
                i += 4;
                if *indicator == "<null>" {
                    tracing::debug!(
                        target = "lantern.assist",
                        problem = description,
                        "dropping finding without indicator"
                    );
                    continue;
                }
                let mut inspection = Inspection::new(description, *solution, 0, 0);
                inspection.problem.indicator = (*indicator).to_owned();
                inspection.severity = Severity::parse(severity);
                found.push((code_index, inspection));
            }
            _ => {
                // Skip the whole run of tag lines so they are not counted as code.
                let run = 1 + rest.iter().take_while(|tag| tag.is_some()).count();
                tracing::warn!(
                    target = "lantern.assist",
                    problem = description,
                    "dropping incomplete tagged finding"
                );
                tag_lines += run;
                i += run;
            }
        }
    }

    let original_lines: Vec<&str> = original.lines().collect();
    let mut code_lines: Vec<(usize, &str)> = Vec::new();
    for_each_code_line(&original_lines, |index, line| code_lines.push((index, line)));

    let mut out: Vec<Inspection> = found
        .into_iter()
        .filter_map(|(code_index, mut inspection)| {
            let Some(&(line, code)) = code_lines.get(code_index) else {
                tracing::warn!(
                    target = "lantern.assist",
                    problem = %inspection.problem.description,
                    code_index,
                    "finding points past the end of the code"
                );
                return None;
            };
            let line = line as u32;
            inspection.problem.position = ProblemPosition {
                start_line: line,
                end_line: line,
                relative_start_line: line,
                relative_end_line: line,
                code: code.to_owned(),
            };
            Some(inspection)
        })
        .collect();
    out.sort_by_key(|inspection| inspection.start_line());
    out
}
