//! Automated remediation: clone, patch, commit and push fixes.
//!
//! The pipeline is strictly sequential since the working copy is a single
//! mutable resource:
//!
//! `Idle → Cloned → CheckedOut → Patched → Committed → Pushed → Commented → Cleaned`
//!
//! The temporary clone is owned by a [`workspace::Workspace`] and removed on
//! every exit path. Failures never escape [`AutoRemediator::run`]; they are
//! logged and reported as a not-applied [`RemediationOutcome`].

pub mod fixes;
pub mod workspace;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::constants::{FIX_AUTHOR_EMAIL, FIX_AUTHOR_NAME};
use crate::models::{Issue, PullRequestRef};
use crate::platform::{CodeHost, PlatformError};
use crate::retry::RetryExecutor;

pub use fixes::IssueKind;
pub use workspace::{GitAuth, GitError, Workspace};

/// Errors that abort a remediation run.
#[derive(Error, Debug)]
pub enum RemediationError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("fix failed: {0}")]
    Fix(String),

    #[error("pull request head branch is unknown")]
    UnknownHead,
}

/// Pipeline progress, for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Idle,
    Cloned,
    CheckedOut,
    Patched,
    Committed,
    Pushed,
    Commented,
    Cleaned,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Cloned => "cloned",
            PipelineStage::CheckedOut => "checked-out",
            PipelineStage::Patched => "patched",
            PipelineStage::Committed => "committed",
            PipelineStage::Pushed => "pushed",
            PipelineStage::Commented => "commented",
            PipelineStage::Cleaned => "cleaned",
        };
        f.write_str(s)
    }
}

/// Result of a remediation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationOutcome {
    pub fixed_count: usize,
    /// Descriptions of the issues whose fix was applied.
    pub applied: Vec<String>,
    /// True only when the fix commit was pushed.
    pub succeeded: bool,
    /// Last stage reached.
    pub stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemediationOutcome {
    fn not_applied(stage: PipelineStage) -> Self {
        Self {
            fixed_count: 0,
            applied: Vec::new(),
            succeeded: false,
            stage,
            error: None,
        }
    }
}

/// Settings for the remediation pipeline.
#[derive(Clone)]
pub struct RemediationSettings {
    /// Base URL for git remotes; the clone URL is `{git_url}/{owner}/{repo}.git`.
    pub git_url: String,
    pub token: Option<String>,
    /// Formatter command line, run in the working copy root.
    pub formatter: Vec<String>,
    pub author_name: String,
    pub author_email: String,
}

impl fmt::Debug for RemediationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemediationSettings")
            .field("git_url", &self.git_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("formatter", &self.formatter)
            .field("author_name", &self.author_name)
            .field("author_email", &self.author_email)
            .finish()
    }
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            git_url: crate::constants::DEFAULT_GIT_URL.to_string(),
            token: None,
            formatter: crate::config::default_formatter(),
            author_name: FIX_AUTHOR_NAME.to_string(),
            author_email: FIX_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// Mutable state of one run.
struct Run {
    pr: String,
    stage: PipelineStage,
    applied: Vec<String>,
}

impl Run {
    fn advance(&mut self, stage: PipelineStage) {
        self.stage = stage;
        info!(pr = %self.pr, stage = %stage, "remediation stage reached");
    }
}

/// Applies fixable issues to the PR branch and pushes a commit.
pub struct AutoRemediator {
    host: Arc<dyn CodeHost>,
    retry: RetryExecutor,
    settings: RemediationSettings,
    auth: GitAuth,
}

impl AutoRemediator {
    pub fn new(
        host: Arc<dyn CodeHost>,
        retry: RetryExecutor,
        settings: RemediationSettings,
    ) -> Self {
        let auth = GitAuth::new(settings.token.clone());
        Self {
            host,
            retry,
            settings,
            auth,
        }
    }

    /// Run the pipeline for the issues marked fixable whose kind is ever
    /// fixed automatically. Never fails.
    pub async fn run(&self, pr: &PullRequestRef, issues: &[Issue]) -> RemediationOutcome {
        let fixable: Vec<&Issue> = issues
            .iter()
            .filter(|i| i.fixable && IssueKind::classify(&i.description).is_auto_fixable())
            .collect();
        if fixable.is_empty() {
            debug!(pr = %pr, "no fixable issues");
            return RemediationOutcome::not_applied(PipelineStage::Idle);
        }

        let mut run = Run {
            pr: pr.to_string(),
            stage: PipelineStage::Idle,
            applied: Vec::new(),
        };

        match self.execute(pr, &fixable, &mut run).await {
            Ok(pushed) => RemediationOutcome {
                fixed_count: run.applied.len(),
                succeeded: pushed,
                applied: run.applied,
                stage: run.stage,
                error: None,
            },
            Err(e) => {
                error!(pr = %pr, stage = %run.stage, error = %e, "remediation failed");
                RemediationOutcome {
                    fixed_count: run.applied.len(),
                    applied: run.applied,
                    succeeded: false,
                    stage: run.stage,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Returns whether a commit was pushed.
    async fn execute(
        &self,
        pr: &PullRequestRef,
        issues: &[&Issue],
        run: &mut Run,
    ) -> Result<bool, RemediationError> {
        let info = self
            .retry
            .execute("get_pull_request", || self.host.get_pull_request(pr))
            .await?;
        if info.head_branch.is_empty() {
            return Err(RemediationError::UnknownHead);
        }
        let branch = info.head_branch;
        let url = self.clone_url(pr, info.head_repo.as_deref());

        let workspace = self
            .retry
            .execute("git_clone", || Workspace::clone_shallow(&url, self.auth.clone()))
            .await?;
        run.advance(PipelineStage::Cloned);

        self.retry
            .execute("git_checkout", || workspace.checkout(&branch))
            .await?;
        run.advance(PipelineStage::CheckedOut);

        for issue in issues {
            let kind = IssueKind::classify(&issue.description);
            match self.apply_fix(kind, &workspace).await {
                Ok(true) => {
                    info!(pr = %run.pr, kind = %kind, "fix applied");
                    run.applied.push(issue.description.clone());
                }
                Ok(false) => debug!(pr = %run.pr, kind = %kind, "fix not applied"),
                Err(e) => {
                    warn!(pr = %run.pr, kind = %kind, error = %e, "fix failed; continuing");
                }
            }
        }
        run.advance(PipelineStage::Patched);

        if run.applied.is_empty() {
            info!(pr = %run.pr, "no fixes applied");
            self.cleanup(workspace, run);
            return Ok(false);
        }

        if !workspace.stage_all().await? {
            info!(pr = %run.pr, "fixes left the tree unchanged; nothing to commit");
            run.applied.clear();
            self.cleanup(workspace, run);
            return Ok(false);
        }

        workspace
            .commit(
                &self.settings.author_name,
                &self.settings.author_email,
                &commit_message(&run.applied),
            )
            .await?;
        run.advance(PipelineStage::Committed);

        self.retry
            .execute("git_push", || workspace.push(&branch))
            .await?;
        run.advance(PipelineStage::Pushed);

        let body = comment_body(&run.applied);
        match self
            .retry
            .execute("create_comment", || self.host.create_comment(pr, &body))
            .await
        {
            Ok(()) => run.advance(PipelineStage::Commented),
            Err(e) => warn!(pr = %run.pr, error = %e, "failed to post remediation comment"),
        }

        self.cleanup(workspace, run);
        Ok(true)
    }

    /// Apply one fix. A formatter run only counts when it changed the tree.
    async fn apply_fix(
        &self,
        kind: IssueKind,
        workspace: &Workspace,
    ) -> Result<bool, RemediationError> {
        let formatter = &self.settings.formatter;
        if kind != IssueKind::Formatting {
            return fixes::apply(kind, workspace.path(), formatter).await;
        }

        // earlier fixes go into the index so only the formatter's edits show
        workspace.stage_all().await?;
        let succeeded = fixes::apply(kind, workspace.path(), formatter).await?;
        Ok(succeeded && workspace.has_unstaged_changes().await?)
    }

    fn cleanup(&self, workspace: Workspace, run: &mut Run) {
        match workspace.close() {
            Ok(()) => run.advance(PipelineStage::Cleaned),
            Err(e) => warn!(pr = %run.pr, error = %e, "cleanup failed"),
        }
    }

    /// Remote for the head repository (forks push back to themselves).
    fn clone_url(&self, pr: &PullRequestRef, head_repo: Option<&str>) -> String {
        let repo = head_repo
            .filter(|r| !r.is_empty())
            .map_or_else(|| pr.full_name(), str::to_string);
        format!("{}/{repo}.git", self.settings.git_url.trim_end_matches('/'))
    }
}

fn commit_message(applied: &[String]) -> String {
    let mut msg = format!("fix: apply {} automated fix(es)\n\n", applied.len());
    for description in applied {
        msg.push_str(&format!("- {description}\n"));
    }
    msg
}

fn comment_body(applied: &[String]) -> String {
    let mut body = String::from("### Automated fixes applied\n\n");
    for description in applied {
        body.push_str(&format!("- {description}\n"));
    }
    body.push_str("\nPlease pull the latest changes before pushing again.\n");
    body
}
