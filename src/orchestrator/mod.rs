//! Review cycle: fetch context, review, decide, post, optionally fix.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::approval::{ApprovalDecision, ApprovalError, ApprovalEvaluator};
use crate::config::Config;
use crate::fetch::{FetchError, FetchSettings, FileFetcher};
use crate::models::{ContentTier, FileStatus, PrContext, PullRequestRef, ReviewResult};
use crate::platform::{CodeHost, ReviewEvent};
use crate::providers::ReviewProvider;
use crate::remediation::{AutoRemediator, RemediationOutcome, RemediationSettings};
use crate::retry::RetryExecutor;

/// Errors from the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOptions {
    /// Post the review verdict to the PR.
    pub post: bool,
    /// Run the auto-fix pipeline for fixable issues.
    pub remediate: bool,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            post: true,
            remediate: false,
        }
    }
}

/// Per-file line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub status: FileStatus,
    pub changes: u64,
    pub fetched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ContentTier>,
}

/// Everything a review cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub pull_request: PullRequestRef,
    pub title: String,
    pub files: Vec<FileSummary>,
    pub review: ReviewResult,
    pub decision: ApprovalDecision,
    pub action: ReviewEvent,
    /// Whether the verdict reached the platform.
    pub posted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationOutcome>,
}

impl CycleReport {
    pub fn fetched_count(&self) -> usize {
        self.files.iter().filter(|f| f.fetched).count()
    }
}

/// Runs one review cycle per pull request.
pub struct ReviewCycle {
    host: Arc<dyn CodeHost>,
    provider: Arc<dyn ReviewProvider>,
    retry: RetryExecutor,
    fetch: FetchSettings,
    evaluator: ApprovalEvaluator,
    remediation: RemediationSettings,
}

impl ReviewCycle {
    pub fn new(
        host: Arc<dyn CodeHost>,
        provider: Arc<dyn ReviewProvider>,
        config: &Config,
    ) -> Self {
        Self::with_retry(host, provider, config, RetryExecutor::new(config.retry_policy()))
    }

    /// Like [`ReviewCycle::new`] with an explicit retry executor.
    pub fn with_retry(
        host: Arc<dyn CodeHost>,
        provider: Arc<dyn ReviewProvider>,
        config: &Config,
        retry: RetryExecutor,
    ) -> Self {
        let evaluator =
            ApprovalEvaluator::new(host.clone(), retry.clone(), config.approval_settings());
        Self {
            host,
            provider,
            retry,
            fetch: config.fetch_settings(),
            evaluator,
            remediation: config.remediation_settings(),
        }
    }

    /// Fetch the PR context only.
    pub async fn fetch_context(&self, pr: &PullRequestRef) -> Result<PrContext, FetchError> {
        FileFetcher::new(self.host.clone(), self.retry.clone(), self.fetch)
            .fetch_context(pr)
            .await
    }

    /// Run the auto-fix pipeline only.
    pub async fn remediate(
        &self,
        pr: &PullRequestRef,
        review: &ReviewResult,
    ) -> RemediationOutcome {
        AutoRemediator::new(self.host.clone(), self.retry.clone(), self.remediation.clone())
            .run(pr, &review.fixable_issues())
            .await
    }

    /// Run the whole cycle.
    ///
    /// Only a failure to list the PR's files is returned as an error;
    /// everything else ends up in the report.
    pub async fn run(
        &self,
        pr: &PullRequestRef,
        options: CycleOptions,
    ) -> Result<CycleReport, OrchestratorError> {
        let ctx = self.fetch_context(pr).await?;

        let (review, decision) = match self.provider.review(&ctx).await {
            Ok(review) => {
                let decision = self.evaluator.evaluate(&ctx, &review).await;
                (review, decision)
            }
            Err(e) => {
                warn!(pr = %pr, error = %e, "reviewer failed; not approving");
                let reason = ApprovalError::ReviewUnavailable(e.to_string());
                (ReviewResult::default(), ApprovalDecision::denied(reason.to_string()))
            }
        };

        let action = choose_action(&decision, &review);
        let posted = if options.post {
            self.post(pr, action, &review_body(&review, &decision)).await
        } else {
            false
        };

        let remediation = if options.remediate {
            Some(self.remediate(pr, &review).await)
        } else {
            None
        };

        info!(
            pr = %pr,
            action = %action,
            posted,
            approve = decision.approve,
            "review cycle finished"
        );

        Ok(CycleReport {
            pull_request: pr.clone(),
            title: ctx.title.clone(),
            files: ctx
                .files
                .iter()
                .map(|f| FileSummary {
                    path: f.path.clone(),
                    status: f.status,
                    changes: f.total_changes(),
                    fetched: f.has_content(),
                    tier: f.source_tier,
                })
                .collect(),
            review,
            decision,
            action,
            posted,
            remediation,
        })
    }

    /// Post the verdict. Failures are logged, never propagated.
    async fn post(&self, pr: &PullRequestRef, action: ReviewEvent, body: &str) -> bool {
        let result = match action {
            ReviewEvent::Comment => {
                self.retry
                    .execute("create_comment", || self.host.create_comment(pr, body))
                    .await
            }
            event => {
                self.retry
                    .execute("create_review", || self.host.create_review(pr, event, body))
                    .await
            }
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(pr = %pr, action = %action, error = %e, "failed to post review");
                false
            }
        }
    }
}

/// Approve when approved, request changes on critical issues, otherwise
/// leave a comment.
pub fn choose_action(decision: &ApprovalDecision, review: &ReviewResult) -> ReviewEvent {
    if decision.approve {
        ReviewEvent::Approve
    } else if review.critical_count() > 0 {
        ReviewEvent::RequestChanges
    } else {
        ReviewEvent::Comment
    }
}

/// Markdown body posted with the verdict.
pub fn review_body(review: &ReviewResult, decision: &ApprovalDecision) -> String {
    let mut body = String::from("## Automated review\n\n");
    if !review.summary.trim().is_empty() {
        body.push_str(review.summary.trim());
        body.push_str("\n\n");
    }
    if !review.issues.is_empty() {
        body.push_str("### Issues\n\n");
        for issue in &review.issues {
            let location = match (&issue.file, issue.line) {
                (Some(file), Some(line)) => format!(" `{file}:{line}`"),
                (Some(file), None) => format!(" `{file}`"),
                _ => String::new(),
            };
            body.push_str(&format!(
                "- **{}**{location}: {}\n",
                issue.severity, issue.description
            ));
        }
        body.push('\n');
    }
    body.push_str(&decision.report());
    body
}
