//! Pull request identity, changed files and the assembled review context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable identity of an open pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }

    /// `owner/repo` without the PR number.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Parse `owner/repo` plus a PR number into a reference.
    pub fn parse(full_name: &str, number: u64) -> Result<Self, String> {
        match full_name.trim().split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::new(owner, repo, number))
            }
            _ => Err(format!(
                "invalid repository '{full_name}': expected the form owner/name"
            )),
        }
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Change status of a file as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

impl FileStatus {
    /// Map the platform's status string; anything unrecognised
    /// (`copied`, `changed`, `unchanged`) is treated as a modification.
    pub fn from_platform(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "added" => FileStatus::Added,
            "removed" | "deleted" => FileStatus::Removed,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Modified,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Renamed => write!(f, "renamed"),
        }
    }
}

/// Which fallback source supplied a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentTier {
    /// Contents API at the PR head commit.
    HeadRef,
    /// Git blob looked up by content identifier.
    Blob,
    /// Static raw-content URL.
    RawUrl,
    /// Contents API on the repository's default branch.
    DefaultBranch,
}

impl fmt::Display for ContentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentTier::HeadRef => write!(f, "head-ref"),
            ContentTier::Blob => write!(f, "blob"),
            ContentTier::RawUrl => write!(f, "raw-url"),
            ContentTier::DefaultBranch => write!(f, "default-branch"),
        }
    }
}

/// One file changed by the pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    /// File text. Empty means "not fetched or unavailable", never "empty file".
    pub content: String,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub status: FileStatus,
    /// 40-hex content identifier (blob sha), when the platform reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    /// Path before a rename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    /// Tier that supplied `content`; `None` when nothing was fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_tier: Option<ContentTier>,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, status: FileStatus, added: u64, removed: u64) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            lines_added: added,
            lines_removed: removed,
            status,
            sha: None,
            previous_path: None,
            source_tier: None,
        }
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Added plus removed lines.
    pub fn total_changes(&self) -> u64 {
        self.lines_added.saturating_add(self.lines_removed)
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

/// Head-side details learned from the PR metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadInfo {
    /// Branch name on the head repository.
    pub branch: String,
    /// Commit sha at the tip of the head branch.
    pub sha: String,
    /// `owner/repo` of the head repository when it differs (forks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_full_name: Option<String>,
}

/// Everything known about a pull request for one review cycle.
///
/// Built once per webhook delivery and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrContext {
    pub pull_request: PullRequestRef,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<HeadInfo>,
    /// Changed files in the platform's reported order.
    pub files: Vec<ChangedFile>,
}

impl PrContext {
    /// Sum of added+removed lines across all files.
    pub fn total_changes(&self) -> u64 {
        self.files.iter().map(ChangedFile::total_changes).sum()
    }

    /// Number of files whose content was resolved.
    pub fn fetched_count(&self) -> usize {
        self.files.iter().filter(|f| f.has_content()).count()
    }
}
