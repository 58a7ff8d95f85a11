//! Catalogue of mechanically safe fixes.
//!
//! Issues are dispatched by a kind derived from their description. Only
//! debug-print removal and formatting are ever applied; TODO markers and
//! potential secrets need a human.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::RemediationError;

/// Lines consisting only of a console debug call, with optional trailing
/// semicolon and whitespace.
///
/// The argument list ends at the call's own closing paren (one level of
/// nesting allowed), so a line with code after the call never matches.
static DEBUG_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^[ \t]*console\.(?:log|debug|info|trace)",
        r"\((?:[^()\n]|\([^()\n]*\))*\)",
        r"[ \t]*;?[ \t]*(?:\r?\n|$)",
    ))
    .expect("debug-call pattern is valid")
});

/// Descriptions that point at credentials. Whole words only; a bare
/// "token" does not count.
static SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:secrets?|passwords?|passwd|api[ _-]?keys?|credentials?|private[ _-]keys?",
        r"|(?:access|auth|api|bearer|refresh|session|oauth)[ _-]?tokens?)\b",
    ))
    .expect("secret pattern is valid")
});

/// Extensions scanned for debug calls.
const SCRIPT_EXTENSIONS: &[&str] = &[
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "vue", "svelte",
];

/// Fix category of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Leftover `console.log` and friends.
    DebugStatement,
    TodoMarker,
    PotentialSecret,
    /// Formatting or whitespace problems handled by the formatter.
    Formatting,
    Other,
}

impl IssueKind {
    /// Derive the kind from an issue description.
    ///
    /// Secrets are checked first so that e.g. "API token logged via
    /// console.log" is never treated as a removable debug call.
    pub fn classify(description: &str) -> Self {
        let d = description.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| d.contains(n));

        if SECRET_RE.is_match(&d) {
            IssueKind::PotentialSecret
        } else if any(&[
            "console.",
            "console statement",
            "console/log",
            "log statement",
            "debug statement",
            "debug print",
        ]) {
            IssueKind::DebugStatement
        } else if any(&["todo", "fixme"]) {
            IssueKind::TodoMarker
        } else if any(&["format", "whitespace", "indent", "trailing space"]) {
            IssueKind::Formatting
        } else {
            IssueKind::Other
        }
    }

    /// Whether this kind is ever fixed automatically.
    pub fn is_auto_fixable(self) -> bool {
        matches!(self, IssueKind::DebugStatement | IssueKind::Formatting)
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueKind::DebugStatement => write!(f, "debug-statement"),
            IssueKind::TodoMarker => write!(f, "todo-marker"),
            IssueKind::PotentialSecret => write!(f, "potential-secret"),
            IssueKind::Formatting => write!(f, "formatting"),
            IssueKind::Other => write!(f, "other"),
        }
    }
}

/// Apply the fix for `kind` inside `root`.
///
/// Returns `Ok(true)` when something was changed (or the formatter exited
/// zero), `Ok(false)` when the kind is excluded or nothing matched. Whether
/// the formatter actually touched the tree is for the caller to check.
pub async fn apply(
    kind: IssueKind,
    root: &Path,
    formatter: &[String],
) -> Result<bool, RemediationError> {
    match kind {
        IssueKind::DebugStatement => {
            let root = root.to_path_buf();
            let removed = tokio::task::spawn_blocking(move || remove_debug_statements(&root))
                .await
                .map_err(|e| RemediationError::Fix(format!("debug-statement task failed: {e}")))??;
            Ok(removed > 0)
        }
        IssueKind::Formatting => run_formatter(root, formatter).await,
        IssueKind::TodoMarker | IssueKind::PotentialSecret | IssueKind::Other => {
            debug!(kind = %kind, "issue kind is never auto-fixed");
            Ok(false)
        }
    }
}

/// Strip debug-call lines from every script file under `root`.
///
/// Walks with `.gitignore` rules applied and hidden paths (including
/// `.git`) skipped. Returns the number of lines removed.
pub fn remove_debug_statements(root: &Path) -> Result<usize, RemediationError> {
    let mut removed = 0;

    for path in script_files(root) {
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        let count = DEBUG_CALL_RE.find_iter(&text).count();
        if count == 0 {
            continue;
        }
        let cleaned = DEBUG_CALL_RE.replace_all(&text, "");
        std::fs::write(&path, cleaned.as_bytes()).map_err(|e| {
            RemediationError::Fix(format!("failed to write {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), lines = count, "removed debug statements");
        removed += count;
    }

    Ok(removed)
}

fn script_files(root: &Path) -> Vec<PathBuf> {
    ignore::WalkBuilder::new(root)
        .require_git(false)
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect()
}

/// Run the configured formatter command in `root`; exit code 0 is success.
async fn run_formatter(root: &Path, formatter: &[String]) -> Result<bool, RemediationError> {
    let Some((program, args)) = formatter.split_first() else {
        debug!("no formatter configured");
        return Ok(false);
    };

    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(root)
        .output()
        .await
        .map_err(|e| RemediationError::Fix(format!("failed to run formatter '{program}': {e}")))?;

    let ok = output.status.success();
    info!(program = %program, success = ok, "formatter finished");
    Ok(ok)
}
