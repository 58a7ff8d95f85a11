//! Auto-approval decision.
//!
//! Six independent criteria are evaluated against the PR context and the
//! review result. A PR is approved only when every one of them passes;
//! anything that cannot be established (CI state, author identity, an
//! empty PR) counts as a failure.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::MAX_APPROVAL_CHANGED_LINES;
use crate::fetch::{extension, is_source_file};
use crate::models::{PrContext, ReviewResult, Severity};
use crate::platform::{CodeHost, PlatformError, PullRequestInfo};
use crate::retry::RetryExecutor;

/// Extensions that count as documentation or configuration.
const DOC_EXTENSIONS: &[&str] = &["md", "json", "yml", "yaml"];

/// Conditions under which no criterion is evaluated at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("automatic approval is disabled")]
    Disabled,

    #[error("pull request has no changed files")]
    EmptyPullRequest,

    #[error("review unavailable: {0}")]
    ReviewUnavailable(String),
}

/// Settings for the approval evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSettings {
    pub enabled: bool,
    /// Empty disables the author check.
    pub trusted_authors: Vec<String>,
    pub max_changed_lines: u64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            trusted_authors: Vec::new(),
            max_changed_lines: MAX_APPROVAL_CHANGED_LINES,
        }
    }
}

/// One pass/fail check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Criterion {
    pub passed: bool,
    pub description: String,
}

impl Criterion {
    fn new(passed: bool, description: impl Into<String>) -> Self {
        Self {
            passed,
            description: description.into(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.passed { "✅" } else { "❌" };
        write!(f, "{marker} {}", self.description)
    }
}

/// Outcome of an approval evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalDecision {
    pub approve: bool,
    pub criteria: Vec<Criterion>,
    /// Set when evaluation was cut short.
    pub reason: Option<String>,
}

impl ApprovalDecision {
    /// Approve only when there is at least one criterion and all passed.
    pub fn from_criteria(criteria: Vec<Criterion>) -> Self {
        let approve = !criteria.is_empty() && criteria.iter().all(|c| c.passed);
        Self {
            approve,
            criteria,
            reason: None,
        }
    }

    /// A closed decision carrying the reason evaluation stopped.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            approve: false,
            criteria: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// Markdown report listing every criterion with its marker.
    pub fn report(&self) -> String {
        let mut out = String::from("### Auto-approval criteria\n\n");
        if let Some(ref reason) = self.reason {
            out.push_str(&format!("❌ Evaluation failed: {reason}\n"));
        }
        for criterion in &self.criteria {
            out.push_str(&format!("{criterion}\n"));
        }
        let verdict = if self.approve {
            "approved"
        } else {
            "not approved"
        };
        out.push_str(&format!("\n**Result:** {verdict}\n"));
        out
    }
}

/// Decides whether a PR qualifies for fully automated approval.
pub struct ApprovalEvaluator {
    host: Arc<dyn CodeHost>,
    retry: RetryExecutor,
    settings: ApprovalSettings,
}

impl ApprovalEvaluator {
    pub fn new(host: Arc<dyn CodeHost>, retry: RetryExecutor, settings: ApprovalSettings) -> Self {
        Self {
            host,
            retry,
            settings,
        }
    }

    /// Evaluate all criteria. Never fails: problems become a denial.
    pub async fn evaluate(&self, ctx: &PrContext, review: &ReviewResult) -> ApprovalDecision {
        let decision = match self.try_evaluate(ctx, review).await {
            Ok(criteria) => ApprovalDecision::from_criteria(criteria),
            Err(e) => {
                warn!(pr = %ctx.pull_request, error = %e, "approval evaluation aborted");
                ApprovalDecision::denied(e.to_string())
            }
        };
        info!(
            pr = %ctx.pull_request,
            approve = decision.approve,
            failed = decision.criteria.iter().filter(|c| !c.passed).count(),
            "approval evaluated"
        );
        decision
    }

    async fn try_evaluate(
        &self,
        ctx: &PrContext,
        review: &ReviewResult,
    ) -> Result<Vec<Criterion>, ApprovalError> {
        if !self.settings.enabled {
            return Err(ApprovalError::Disabled);
        }
        if ctx.files.is_empty() {
            return Err(ApprovalError::EmptyPullRequest);
        }

        let needs_head = ctx.head.as_ref().is_none_or(|h| h.sha.is_empty());
        let needs_author = !self.settings.trusted_authors.is_empty() && ctx.author.is_none();
        let metadata = if needs_head || needs_author {
            Some(self.fetch_metadata(ctx).await)
        } else {
            None
        };

        let head_sha = match (&ctx.head, &metadata) {
            (Some(head), _) if !head.sha.is_empty() => Ok(head.sha.clone()),
            (_, Some(Ok(info))) if !info.head_sha.is_empty() => Ok(info.head_sha.clone()),
            (_, Some(Err(e))) => Err(e.to_string()),
            _ => Err("head commit unknown".to_string()),
        };
        let author = match (&ctx.author, &metadata) {
            (Some(author), _) => Ok(author.clone()),
            (_, Some(Ok(PullRequestInfo {
                author: Some(author),
                ..
            }))) => Ok(author.clone()),
            (_, Some(Err(e))) => Err(e.to_string()),
            _ => Err("author unknown".to_string()),
        };

        Ok(vec![
            no_critical_issues(review),
            small_change(ctx, self.settings.max_changed_lines),
            docs_or_config_only(ctx),
            tests_accompany_source(ctx),
            self.checks_green(ctx, head_sha).await,
            trusted_author(&self.settings.trusted_authors, author),
        ])
    }

    async fn fetch_metadata(&self, ctx: &PrContext) -> Result<PullRequestInfo, PlatformError> {
        let pr = &ctx.pull_request;
        self.retry
            .execute("get_pull_request", || self.host.get_pull_request(pr))
            .await
    }

    /// Criterion 5: every check-run at the head commit is completed and
    /// successful.
    async fn checks_green(&self, ctx: &PrContext, head_sha: Result<String, String>) -> Criterion {
        let sha = match head_sha {
            Ok(sha) => sha,
            Err(e) => return Criterion::new(false, format!("CI status unavailable ({e})")),
        };

        let pr = &ctx.pull_request;
        let runs = match self
            .retry
            .execute("list_check_runs", || self.host.list_check_runs(pr, &sha))
            .await
        {
            Ok(runs) => runs,
            Err(e) => {
                warn!(pr = %pr, error = %e, "failed to fetch check-runs");
                return Criterion::new(false, format!("CI status unavailable ({e})"));
            }
        };

        if runs.is_empty() {
            return Criterion::new(false, "No CI check-runs reported");
        }
        let green = runs.iter().filter(|r| r.is_green()).count();
        debug!(pr = %pr, green, total = runs.len(), "check-runs fetched");
        Criterion::new(
            green == runs.len(),
            format!("All CI checks passed ({green}/{} green)", runs.len()),
        )
    }
}

/// Criterion 1.
fn no_critical_issues(review: &ReviewResult) -> Criterion {
    let critical = review
        .issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .count();
    Criterion::new(
        critical == 0,
        format!("No critical issues ({critical} found)"),
    )
}

/// Criterion 2.
fn small_change(ctx: &PrContext, max_changed_lines: u64) -> Criterion {
    let total = ctx.total_changes();
    Criterion::new(
        total < max_changed_lines,
        format!("Fewer than {max_changed_lines} changed lines ({total} changed)"),
    )
}

fn is_doc_or_config(path: &str) -> bool {
    path.contains("docs/")
        || extension(path).is_some_and(|ext| DOC_EXTENSIONS.contains(&ext.as_str()))
}

/// Criterion 3.
fn docs_or_config_only(ctx: &PrContext) -> Criterion {
    let others: Vec<&str> = ctx
        .files
        .iter()
        .map(|f| f.path.as_str())
        .filter(|p| !is_doc_or_config(p))
        .collect();
    if others.is_empty() {
        Criterion::new(true, "Only documentation/config files changed")
    } else {
        Criterion::new(
            false,
            format!(
                "Only documentation/config files changed ({} other file(s), e.g. {})",
                others.len(),
                others[0]
            ),
        )
    }
}

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.contains("test") || lower.contains("spec")
}

/// Criterion 4.
fn tests_accompany_source(ctx: &PrContext) -> Criterion {
    let has_source = ctx.files.iter().any(|f| is_source_file(&f.path));
    if !has_source {
        return Criterion::new(true, "No source files changed, tests not required");
    }
    let has_tests = ctx.files.iter().any(|f| is_test_path(&f.path));
    Criterion::new(has_tests, "Source changes include tests")
}

/// Criterion 6.
fn trusted_author(trusted: &[String], author: Result<String, String>) -> Criterion {
    if trusted.is_empty() {
        return Criterion::new(true, "Trusted-author check disabled");
    }
    match author {
        Ok(author) => {
            let ok = trusted.iter().any(|t| t.eq_ignore_ascii_case(&author));
            let verdict = if ok { "is" } else { "is not" };
            Criterion::new(ok, format!("Author {author} {verdict} trusted"))
        }
        Err(e) => Criterion::new(false, format!("Author identity unavailable ({e})")),
    }
}
