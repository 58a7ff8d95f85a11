//! Tiered content resolution for a single changed file.
//!
//! The platform is not always consistent about where a file's text can be
//! found: blobs go missing, refs get rebased away, shas go stale. The
//! resolver walks an ordered list of [`ContentSource`]s and keeps the
//! first one that yields text. A failing source is logged and skipped;
//! when every source fails the file ends up with empty content.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::models::{ChangedFile, ContentTier, PullRequestRef};
use crate::platform::{CodeHost, EntryKind, PlatformError};
use crate::retry::RetryExecutor;

/// One way of obtaining a file's text.
///
/// `Ok(None)` means the source had nothing usable (no sha, a directory,
/// no payload); errors are platform failures. Both move the resolver on
/// to the next source.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn tier(&self) -> ContentTier;

    async fn fetch(
        &self,
        resolver: &ContentResolver,
        file: &ChangedFile,
    ) -> Result<Option<String>, PlatformError>;
}

/// Outcome of resolving one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Empty when no source produced text.
    pub content: String,
    pub tier: Option<ContentTier>,
}

impl Resolved {
    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// Resolves file content for one pull request.
///
/// The head sha and default branch are looked up at most once and shared
/// by every file of the review cycle.
pub struct ContentResolver {
    host: Arc<dyn CodeHost>,
    pr: PullRequestRef,
    retry: RetryExecutor,
    head_sha: OnceCell<String>,
    default_branch: OnceCell<String>,
    sources: Vec<Box<dyn ContentSource>>,
}

impl ContentResolver {
    /// Resolver using the four standard sources in order: head ref, blob,
    /// raw URL, default branch.
    pub fn new(host: Arc<dyn CodeHost>, pr: PullRequestRef, retry: RetryExecutor) -> Self {
        Self::with_sources(host, pr, retry, default_sources())
    }

    pub fn with_sources(
        host: Arc<dyn CodeHost>,
        pr: PullRequestRef,
        retry: RetryExecutor,
        sources: Vec<Box<dyn ContentSource>>,
    ) -> Self {
        Self {
            host,
            pr,
            retry,
            head_sha: OnceCell::new(),
            default_branch: OnceCell::new(),
            sources,
        }
    }

    /// Seed the head sha when PR metadata has already been fetched.
    pub fn with_head_sha(self, sha: impl Into<String>) -> Self {
        let sha = sha.into();
        if !sha.is_empty() {
            let _ = self.head_sha.set(sha);
        }
        self
    }

    pub fn host(&self) -> &dyn CodeHost {
        self.host.as_ref()
    }

    pub fn pull_request(&self) -> &PullRequestRef {
        &self.pr
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Head commit sha of the PR, fetching PR metadata on first use.
    pub async fn head_sha(&self) -> Result<String, PlatformError> {
        self.head_sha
            .get_or_try_init(|| async {
                let info = self
                    .retry
                    .execute("get_pull_request", || self.host.get_pull_request(&self.pr))
                    .await?;
                Ok::<_, PlatformError>(info.head_sha)
            })
            .await
            .cloned()
    }

    /// Default branch of the repository, fetched on first use.
    pub async fn default_branch(&self) -> Result<String, PlatformError> {
        self.default_branch
            .get_or_try_init(|| async {
                let repo = self
                    .retry
                    .execute("get_repository", || self.host.get_repository(&self.pr))
                    .await?;
                Ok::<_, PlatformError>(repo.default_branch)
            })
            .await
            .cloned()
    }

    /// Contents-API lookup of `path` at `reference`; only regular files
    /// count.
    pub async fn lookup_file(
        &self,
        path: &str,
        reference: &str,
    ) -> Result<Option<String>, PlatformError> {
        let entry = self
            .retry
            .execute("get_contents", || self.host.get_contents(&self.pr, path, reference))
            .await?;

        if entry.kind != EntryKind::File {
            debug!(path, reference, kind = ?entry.kind, "not a regular file");
            return Ok(None);
        }
        match entry.content {
            Some(content) => decode_payload(&content, entry.encoding.as_deref()),
            None => Ok(None),
        }
    }

    /// Try every source in order; the first to produce text wins.
    pub async fn resolve(&self, file: &ChangedFile) -> Resolved {
        let pr = self.pr.to_string();

        for source in &self.sources {
            let tier = source.tier();
            match source.fetch(self, file).await {
                Ok(Some(content)) => {
                    debug!(pr = %pr, path = %file.path, tier = %tier, "content resolved");
                    return Resolved {
                        content,
                        tier: Some(tier),
                    };
                }
                Ok(None) => {
                    debug!(pr = %pr, path = %file.path, tier = %tier, "tier had no content");
                }
                Err(e) => {
                    warn!(
                        pr = %pr,
                        path = %file.path,
                        tier = %tier,
                        error = %e,
                        "content tier failed, trying next"
                    );
                }
            }
        }

        info!(pr = %pr, path = %file.path, "content unavailable from every tier");
        Resolved::unavailable()
    }
}

/// The standard source chain.
pub fn default_sources() -> Vec<Box<dyn ContentSource>> {
    vec![
        Box::new(HeadRefSource),
        Box::new(BlobSource),
        Box::new(RawUrlSource),
        Box::new(DefaultBranchSource),
    ]
}

/// The file at the PR head commit.
pub struct HeadRefSource;

#[async_trait]
impl ContentSource for HeadRefSource {
    fn tier(&self) -> ContentTier {
        ContentTier::HeadRef
    }

    async fn fetch(
        &self,
        resolver: &ContentResolver,
        file: &ChangedFile,
    ) -> Result<Option<String>, PlatformError> {
        let sha = resolver.head_sha().await?;
        resolver.lookup_file(&file.path, &sha).await
    }
}

/// The git blob named by the file's content sha. Immune to renames.
pub struct BlobSource;

#[async_trait]
impl ContentSource for BlobSource {
    fn tier(&self) -> ContentTier {
        ContentTier::Blob
    }

    async fn fetch(
        &self,
        resolver: &ContentResolver,
        file: &ChangedFile,
    ) -> Result<Option<String>, PlatformError> {
        let Some(sha) = file.sha.as_deref().filter(|s| is_object_id(s)) else {
            return Ok(None);
        };
        let blob = resolver
            .retry()
            .execute("get_blob", || resolver.host().get_blob(resolver.pull_request(), sha))
            .await?;
        decode_payload(&blob.content, blob.encoding.as_deref())
    }
}

/// Plain-text fetch from the static raw-content host.
pub struct RawUrlSource;

#[async_trait]
impl ContentSource for RawUrlSource {
    fn tier(&self) -> ContentTier {
        ContentTier::RawUrl
    }

    async fn fetch(
        &self,
        resolver: &ContentResolver,
        file: &ChangedFile,
    ) -> Result<Option<String>, PlatformError> {
        let sha = resolver.head_sha().await?;
        let url = resolver
            .host()
            .raw_content_url(resolver.pull_request(), &sha, &file.path);
        let text = resolver
            .retry()
            .execute("fetch_raw", || resolver.host().fetch_raw(&url))
            .await?;
        Ok(Some(text))
    }
}

/// The same path on the repository's default branch.
pub struct DefaultBranchSource;

#[async_trait]
impl ContentSource for DefaultBranchSource {
    fn tier(&self) -> ContentTier {
        ContentTier::DefaultBranch
    }

    async fn fetch(
        &self,
        resolver: &ContentResolver,
        file: &ChangedFile,
    ) -> Result<Option<String>, PlatformError> {
        let branch = resolver.default_branch().await?;
        resolver.lookup_file(&file.path, &branch).await
    }
}

/// 40 hex characters.
fn is_object_id(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Undo the transport encoding of an API payload.
///
/// `encoding: "none"` marks files too large for the API to inline; that
/// yields no content rather than an empty string.
fn decode_payload(content: &str, encoding: Option<&str>) -> Result<Option<String>, PlatformError> {
    match encoding.map(str::to_ascii_lowercase).as_deref() {
        Some("base64") => {
            let compact: String = content.split_whitespace().collect();
            let bytes = BASE64
                .decode(compact.as_bytes())
                .map_err(|e| PlatformError::Decode(format!("invalid base64 payload: {e}")))?;
            let text = String::from_utf8(bytes)
                .map_err(|_| PlatformError::Decode("payload is not UTF-8 text".into()))?;
            Ok(Some(text))
        }
        Some("none") => Ok(None),
        _ => Ok(Some(content.to_string())),
    }
}
