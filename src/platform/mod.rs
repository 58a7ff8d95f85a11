//! Code-hosting platform abstraction.
//!
//! [`CodeHost`] is the seam between the pipeline and the platform API.
//! [`github::GithubClient`] talks to the GitHub REST API;
//! [`fakes::FakeHost`] is an in-memory stand-in for tests.

pub mod fakes;
pub mod github;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PullRequestRef;
use crate::retry::{Classify, ErrorKind};

/// Errors from code-host calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Build an error from a non-success HTTP status and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        match status {
            403 | 429 if lower.contains("rate limit") => {
                PlatformError::RateLimited(truncate(body, 200))
            }
            404 => PlatformError::NotFound(truncate(body, 200)),
            _ => PlatformError::Http {
                status,
                message: truncate(body, 200),
            },
        }
    }
}

impl Classify for PlatformError {
    fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::RateLimited(_) => ErrorKind::RateLimited,
            PlatformError::Http { status: 429, .. } => ErrorKind::TooManyRequests,
            PlatformError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Fatal,
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}...")
}

/// A file entry from the PR's changed-file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrFileEntry {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub previous_filename: Option<String>,
}

/// Pull request metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestInfo {
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub head_branch: String,
    pub head_sha: String,
    /// `owner/repo` of the head repository, if the platform reported it.
    pub head_repo: Option<String>,
}

/// Kind of object found at a repository path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// Result of a path lookup at a given reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub kind: EntryKind,
    /// Raw payload as returned by the API; may be transport-encoded.
    pub content: Option<String>,
    /// Transport encoding of `content` (`"base64"` on GitHub).
    pub encoding: Option<String>,
}

/// Git blob addressed by its sha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content: String,
    pub encoding: Option<String>,
}

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub default_branch: String,
}

/// A CI check-run attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl CheckRun {
    pub fn is_green(&self) -> bool {
        self.status == "completed" && self.conclusion.as_deref() == Some("success")
    }
}

/// Review verdict posted on the pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewEvent {
    pub fn as_api_str(self) -> &'static str {
        match self {
            ReviewEvent::Approve => "APPROVE",
            ReviewEvent::RequestChanges => "REQUEST_CHANGES",
            ReviewEvent::Comment => "COMMENT",
        }
    }
}

impl std::fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewEvent::Approve => write!(f, "approve"),
            ReviewEvent::RequestChanges => write!(f, "request-changes"),
            ReviewEvent::Comment => write!(f, "comment"),
        }
    }
}

/// Operations the pipeline consumes from the code-hosting platform.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// List every file changed by the pull request, in platform order.
    async fn list_pull_request_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<PrFileEntry>, PlatformError>;

    async fn get_pull_request(&self, pr: &PullRequestRef)
        -> Result<PullRequestInfo, PlatformError>;

    /// Look up `path` at `reference` in the PR's repository.
    async fn get_contents(
        &self,
        pr: &PullRequestRef,
        path: &str,
        reference: &str,
    ) -> Result<ContentEntry, PlatformError>;

    async fn get_blob(&self, pr: &PullRequestRef, sha: &str) -> Result<Blob, PlatformError>;

    /// Static URL serving the raw text of `path` at `reference`.
    fn raw_content_url(&self, pr: &PullRequestRef, reference: &str, path: &str) -> String;

    /// Fetch plain text from a raw-content URL.
    async fn fetch_raw(&self, url: &str) -> Result<String, PlatformError>;

    async fn get_repository(&self, pr: &PullRequestRef) -> Result<RepositoryInfo, PlatformError>;

    async fn list_check_runs(
        &self,
        pr: &PullRequestRef,
        reference: &str,
    ) -> Result<Vec<CheckRun>, PlatformError>;

    async fn create_review(
        &self,
        pr: &PullRequestRef,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), PlatformError>;

    async fn create_comment(&self, pr: &PullRequestRef, body: &str) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            PlatformError::from_status(403, "API rate limit exceeded for installation"),
            PlatformError::RateLimited(_)
        ));
        assert!(matches!(
            PlatformError::from_status(404, "Not Found"),
            PlatformError::NotFound(_)
        ));
        assert_eq!(
            PlatformError::from_status(403, "Resource not accessible by integration"),
            PlatformError::Http {
                status: 403,
                message: "Resource not accessible by integration".into()
            }
        );
    }

    #[test]
    fn classification_tags() {
        assert_eq!(
            PlatformError::RateLimited("x".into()).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            PlatformError::from_status(429, "slow down").kind(),
            ErrorKind::TooManyRequests
        );
        assert_eq!(PlatformError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            PlatformError::from_status(500, "boom").kind(),
            ErrorKind::Fatal
        );
        assert_eq!(PlatformError::Transport("reset".into()).kind(), ErrorKind::Fatal);
        assert_eq!(PlatformError::Decode("bad json".into()).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        match PlatformError::from_status(500, &body) {
            PlatformError::Http { message, .. } => {
                assert!(message.len() < 300);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn check_run_green_requires_completed_success() {
        let run = |status: &str, conclusion: Option<&str>| CheckRun {
            name: "ci".into(),
            status: status.into(),
            conclusion: conclusion.map(String::from),
        };
        assert!(run("completed", Some("success")).is_green());
        assert!(!run("completed", Some("failure")).is_green());
        assert!(!run("completed", Some("neutral")).is_green());
        assert!(!run("in_progress", None).is_green());
    }
}
