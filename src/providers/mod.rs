//! ReviewProvider trait and the file-backed reviewer.
//!
//! The language model and static scanner run outside this crate. Their
//! combined output reaches the review cycle through [`ReviewProvider`].

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::models::{Issue, PrContext, ReviewResult};

/// How much of an unparseable payload to echo back in errors.
const PARSE_ERROR_PREVIEW_LEN: usize = 200;

/// Errors from the review provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to read review from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse review: {0}")]
    Parse(String),

    #[error("reviewer unavailable: {0}")]
    Unavailable(String),
}

/// Produces the review result for a pull request.
#[async_trait]
pub trait ReviewProvider: Send + Sync {
    async fn review(&self, ctx: &PrContext) -> Result<ReviewResult, ProviderError>;
}

/// Reads a review result written by the external LLM/scanner step.
#[derive(Debug, Clone)]
pub struct FileReviewProvider {
    path: PathBuf,
}

impl FileReviewProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file without a PR context.
    pub async fn load(&self) -> Result<ReviewResult, ProviderError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ProviderError::Read {
                path: self.path.clone(),
                source,
            })?;
        parse_review(&text)
    }
}

#[async_trait]
impl ReviewProvider for FileReviewProvider {
    async fn review(&self, ctx: &PrContext) -> Result<ReviewResult, ProviderError> {
        let result = self.load().await?;
        debug!(
            pr = %ctx.pull_request,
            issues = result.issues.len(),
            path = %self.path.display(),
            "review loaded"
        );
        Ok(result)
    }
}

/// Returns a fixed result; useful when the review is already in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticReviewProvider {
    result: ReviewResult,
}

impl StaticReviewProvider {
    pub fn new(result: ReviewResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl ReviewProvider for StaticReviewProvider {
    async fn review(&self, _ctx: &PrContext) -> Result<ReviewResult, ProviderError> {
        Ok(self.result.clone())
    }
}

/// Parse reviewer output.
///
/// Accepts a `ReviewResult` object, a bare array of issues, or either of
/// those wrapped in a markdown code fence. Blank input is an empty review.
pub fn parse_review(text: &str) -> Result<ReviewResult, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(ReviewResult::default());
    }

    for candidate in json_candidates(trimmed) {
        if let Ok(result) = serde_json::from_str::<ReviewResult>(&candidate) {
            return Ok(result);
        }
        if let Ok(issues) = serde_json::from_str::<Vec<Issue>>(&candidate) {
            return Ok(ReviewResult {
                summary: String::new(),
                issues,
            });
        }
    }

    let preview: String = trimmed.chars().take(PARSE_ERROR_PREVIEW_LEN).collect();
    Err(ProviderError::Parse(format!(
        "expected a review object or an issue array, got: {preview}"
    )))
}

/// Content inside markdown code fences. The closing fence must start a
/// line so backticks inside JSON strings do not end the match.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").expect("fence pattern is valid")
});

fn json_candidates(text: &str) -> Vec<String> {
    let mut candidates = vec![text.to_string()];
    for cap in FENCE_RE.captures_iter(text) {
        if let Some(inner) = cap.get(1) {
            let inner = inner.as_str().trim();
            if !inner.is_empty() {
                candidates.push(inner.to_string());
            }
        }
    }
    candidates
}
