use std::fmt;

use lantern_cache::DerivedResult;
use lantern_core::ResultId;
use serde::{Deserialize, Serialize};

/// A code-improvement suggestion attached to a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub id: ResultId,
    pub problem: Problem,
    pub solution: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub description: String,
    /// The code token the suggestion points at; empty when the backend did not name one.
    pub indicator: String,
    pub position: ProblemPosition,
}

/// Where an inspection applies.
///
/// `start_line`/`end_line` are absolute document lines and are recomputed from the relative
/// lines whenever the inspection is read from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemPosition {
    pub start_line: u32,
    pub end_line: u32,
    pub relative_start_line: u32,
    pub relative_end_line: u32,
    /// Text of the first affected line.
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    High,
    Medium,
    Low,
    Other(String),
}

impl Severity {
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        match label.to_ascii_uppercase().as_str() {
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::Other(label.to_owned()),
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Other(String::new())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => f.write_str("HIGH"),
            Severity::Medium => f.write_str("MEDIUM"),
            Severity::Low => f.write_str("LOW"),
            Severity::Other(label) => f.write_str(label),
        }
    }
}

impl From<String> for Severity {
    fn from(label: String) -> Self {
        Severity::parse(&label)
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.to_string()
    }
}

impl Inspection {
    pub fn new(description: impl Into<String>, solution: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            id: ResultId::next(),
            problem: Problem {
                description: description.into(),
                indicator: String::new(),
                position: ProblemPosition {
                    start_line,
                    end_line,
                    ..ProblemPosition::default()
                },
            },
            solution: solution.into(),
            severity: Severity::default(),
        }
    }

    pub fn start_line(&self) -> u32 {
        self.problem.position.start_line
    }
}

impl DerivedResult for Inspection {
    fn id(&self) -> ResultId {
        self.id
    }

    fn anchor_to(&mut self, symbol_start_line: u32) {
        let position = &mut self.problem.position;
        position.start_line = symbol_start_line + position.relative_start_line;
        position.end_line = symbol_start_line + position.relative_end_line;
    }
}
