//! Review results handed over by the external reviewer (LLM + scanner).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational suggestion.
    Info,
    /// Potential issue that should be addressed.
    Warning,
    /// Blocking issue; prevents auto-approval.
    Critical,
}

/// Lenient deserializer for `Severity`.
///
/// Reviewers produce many spellings ("error", "high", "minor", ...);
/// they are normalised here rather than rejected.
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.to_lowercase().as_str() {
            "info" | "note" | "suggestion" | "low" | "minor" | "trivial" | "style" => {
                Severity::Info
            }
            "critical" | "error" | "high" | "severe" | "blocker" | "fatal" => Severity::Critical,
            _ => Severity::Warning,
        })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A single issue reported against the pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// File path relative to the repository root, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    /// Human-readable description; also drives fix classification.
    pub description: String,
    /// Whether the scanner marked this as mechanically correctable.
    #[serde(default)]
    pub fixable: bool,
}

impl Issue {
    pub fn new(severity: Severity, description: impl Into<String>) -> Self {
        Self {
            file: None,
            line: None,
            severity,
            description: description.into(),
            fixable: false,
        }
    }

    pub fn fixable(mut self) -> Self {
        self.fixable = true;
        self
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

/// Output of the external reviewer for one pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// Free-form summary drafted by the language model.
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl ReviewResult {
    pub fn critical_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count()
    }

    /// Issues the caller pre-classified as auto-fixable.
    pub fn fixable_issues(&self) -> Vec<Issue> {
        self.issues.iter().filter(|i| i.fixable).cloned().collect()
    }
}
