//! Builds the [`PrContext`] for a review cycle.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::resolver::{ContentResolver, Resolved};
use super::{FetchError, FetchSettings, is_eligible};
use crate::models::{ChangedFile, FileStatus, HeadInfo, PrContext, PullRequestRef};
use crate::platform::{CodeHost, PrFileEntry};
use crate::retry::RetryExecutor;

/// Lists a PR's files and fetches eligible content with bounded
/// concurrency.
pub struct FileFetcher {
    host: Arc<dyn CodeHost>,
    retry: RetryExecutor,
    settings: FetchSettings,
}

impl FileFetcher {
    pub fn new(host: Arc<dyn CodeHost>, retry: RetryExecutor, settings: FetchSettings) -> Self {
        Self {
            host,
            retry,
            settings,
        }
    }

    /// Assemble the full context for `pr`.
    ///
    /// Only a failure to list the changed files is an error. Missing PR
    /// metadata leaves title, description and head empty; unresolved
    /// files keep empty content.
    pub async fn fetch_context(&self, pr: &PullRequestRef) -> Result<PrContext, FetchError> {
        let entries = self
            .retry
            .execute("list_pull_request_files", || {
                self.host.list_pull_request_files(pr)
            })
            .await
            .map_err(|source| FetchError::FileList {
                pr: pr.to_string(),
                source,
            })?;

        let metadata = match self
            .retry
            .execute("get_pull_request", || self.host.get_pull_request(pr))
            .await
        {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(pr = %pr, error = %e, "failed to fetch PR metadata; continuing without it");
                None
            }
        };

        let mut files: Vec<ChangedFile> = entries.into_iter().map(changed_file).collect();

        let mut resolver = ContentResolver::new(self.host.clone(), pr.clone(), self.retry.clone());
        if let Some(ref info) = metadata {
            resolver = resolver.with_head_sha(&info.head_sha);
        }
        self.fill_content(Arc::new(resolver), &mut files).await;

        info!(
            pr = %pr,
            files = files.len(),
            fetched = files.iter().filter(|f| f.has_content()).count(),
            "pull request context assembled"
        );

        let (title, description, author, head) = match metadata {
            Some(info) => (
                info.title,
                info.body,
                info.author,
                Some(HeadInfo {
                    branch: info.head_branch,
                    sha: info.head_sha,
                    repo_full_name: info.head_repo,
                }),
            ),
            None => (String::new(), String::new(), None, None),
        };

        Ok(PrContext {
            pull_request: pr.clone(),
            title,
            description,
            author,
            head,
            files,
        })
    }

    /// Resolve content for every eligible file, at most
    /// `max_concurrent` at a time. Results land at their original index.
    async fn fill_content(&self, resolver: Arc<ContentResolver>, files: &mut [ChangedFile]) {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let mut join_set = JoinSet::new();

        for (index, file) in files.iter().enumerate() {
            if !is_eligible(file, self.settings.max_file_changes) {
                debug!(path = %file.path, changes = file.total_changes(), "skipping content fetch");
                continue;
            }

            let sem = semaphore.clone();
            let resolver = resolver.clone();
            let file = file.clone();
            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return (index, Resolved::unavailable());
                };
                (index, resolver.resolve(&file).await)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((index, resolved)) => {
                    if let Some(file) = files.get_mut(index) {
                        file.content = resolved.content;
                        file.source_tier = resolved.tier;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "content task panicked; file left without content");
                }
            }
        }
    }
}

fn changed_file(entry: PrFileEntry) -> ChangedFile {
    let mut file = ChangedFile::new(
        entry.filename,
        FileStatus::from_platform(&entry.status),
        entry.additions,
        entry.deletions,
    );
    file.sha = entry.sha;
    file.previous_path = entry.previous_filename;
    file
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentTier;
    use crate::platform::fakes::{FakeHost, Operation};
    use crate::platform::{PlatformError, PullRequestInfo};
    use crate::retry::{RecordingSleeper, RetryPolicy};

    const HEAD: &str = "abababababababababababababababababababab";

    fn pr() -> PullRequestRef {
        PullRequestRef::new("acme", "widgets", 4)
    }

    fn fetcher(host: Arc<FakeHost>) -> FileFetcher {
        let retry =
            RetryExecutor::with_sleeper(RetryPolicy::default(), Arc::new(RecordingSleeper::new()));
        FileFetcher::new(host, retry, FetchSettings::default())
    }

    fn info() -> PullRequestInfo {
        PullRequestInfo {
            title: "Add widget".into(),
            body: "Adds the widget".into(),
            author: Some("octocat".into()),
            head_branch: "widget".into(),
            head_sha: HEAD.into(),
            head_repo: Some("octocat/widgets".into()),
        }
    }

    #[tokio::test]
    async fn builds_context_in_platform_order() {
        let host = Arc::new(
            FakeHost::new()
                .with_pull_request(info())
                .with_files(vec![
                    FakeHost::file_entry("src/b.ts", "modified", 2, 1),
                    FakeHost::file_entry("README.md", "modified", 1, 0),
                    FakeHost::file_entry("src/a.rs", "added", 5, 0),
                ])
                .with_file_content(HEAD, "src/b.ts", "b")
                .with_file_content(HEAD, "src/a.rs", "a"),
        );
        let ctx = fetcher(host.clone()).fetch_context(&pr()).await.unwrap();

        let paths: Vec<_> = ctx.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["src/b.ts", "README.md", "src/a.rs"]);
        assert_eq!(ctx.files[0].content, "b");
        assert_eq!(ctx.files[0].source_tier, Some(ContentTier::HeadRef));
        assert!(ctx.files[1].content.is_empty());
        assert_eq!(ctx.files[2].content, "a");
        assert_eq!(ctx.files[2].status, FileStatus::Added);

        assert_eq!(ctx.title, "Add widget");
        assert_eq!(ctx.author.as_deref(), Some("octocat"));
        let head = ctx.head.unwrap();
        assert_eq!(head.branch, "widget");
        assert_eq!(head.repo_full_name.as_deref(), Some("octocat/widgets"));
        // metadata fetched once, reused by the resolver
        assert_eq!(host.calls(Operation::GetPullRequest), 1);
    }

    #[tokio::test]
    async fn file_list_failure_is_fatal() {
        let host = Arc::new(
            FakeHost::new().failing(Operation::ListFiles, PlatformError::from_status(500, "boom")),
        );
        let err = fetcher(host).fetch_context(&pr()).await.unwrap_err();
        assert!(err.to_string().contains("acme/widgets#4"));
    }

    #[tokio::test]
    async fn metadata_failure_is_not_fatal() {
        let host = Arc::new(
            FakeHost::new()
                .with_files(vec![FakeHost::file_entry("docs/a.md", "modified", 1, 1)])
                .failing(Operation::GetPullRequest, PlatformError::from_status(500, "boom")),
        );
        let ctx = fetcher(host).fetch_context(&pr()).await.unwrap();
        assert!(ctx.title.is_empty());
        assert!(ctx.head.is_none());
        assert_eq!(ctx.files.len(), 1);
    }

    #[tokio::test]
    async fn single_file_failure_does_not_abort_batch() {
        let host = Arc::new(
            FakeHost::new()
                .with_pull_request(info())
                .with_files(vec![
                    FakeHost::file_entry("src/missing.ts", "modified", 1, 0),
                    FakeHost::file_entry("src/ok.ts", "modified", 1, 0),
                ])
                .with_file_content(HEAD, "src/ok.ts", "ok"),
        );
        let ctx = fetcher(host).fetch_context(&pr()).await.unwrap();
        assert!(ctx.files[0].content.is_empty());
        assert_eq!(ctx.files[0].source_tier, None);
        assert_eq!(ctx.files[1].content, "ok");
    }
}
