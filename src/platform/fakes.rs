//! In-memory [`CodeHost`] for tests.
//!
//! `FakeHost` serves canned files, contents, blobs and check-runs, records
//! every call, can be told to fail a given operation (a fixed number of
//! times or forever), and tracks how many content lookups were in flight
//! at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::{
    Blob, CheckRun, CodeHost, ContentEntry, EntryKind, PlatformError, PrFileEntry,
    PullRequestInfo, RepositoryInfo, ReviewEvent,
};
use crate::models::PullRequestRef;

/// Operations of [`CodeHost`], used to target failure injection and to
/// count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListFiles,
    GetPullRequest,
    GetContents,
    GetBlob,
    FetchRaw,
    GetRepository,
    ListCheckRuns,
    CreateReview,
    CreateComment,
}

#[derive(Debug, Clone)]
struct Failure {
    error: PlatformError,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    files: Vec<PrFileEntry>,
    pull_request: Option<PullRequestInfo>,
    contents: HashMap<(String, String), ContentEntry>,
    blobs: HashMap<String, Blob>,
    raw: HashMap<String, String>,
    default_branch: Option<String>,
    check_runs: HashMap<String, Vec<CheckRun>>,
    failures: HashMap<Operation, Failure>,
    calls: Vec<(Operation, String)>,
    reviews: Vec<(ReviewEvent, String)>,
    comments: Vec<String>,
}

/// Scriptable in-memory code host.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<State>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight gauge when a content lookup finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build a changed-file listing entry.
    pub fn file_entry(path: &str, status: &str, additions: u64, deletions: u64) -> PrFileEntry {
        PrFileEntry {
            filename: path.to_string(),
            status: status.to_string(),
            additions,
            deletions,
            sha: None,
            previous_filename: None,
        }
    }

    /// A regular file entry carrying `text` base64-encoded, as GitHub
    /// returns it.
    pub fn encoded_file(text: &str) -> ContentEntry {
        ContentEntry {
            kind: EntryKind::File,
            content: Some(BASE64.encode(text)),
            encoding: Some("base64".to_string()),
        }
    }

    // -- setup ---------------------------------------------------------------

    pub fn with_files(self, files: Vec<PrFileEntry>) -> Self {
        self.state().files = files;
        self
    }

    pub fn with_pull_request(self, info: PullRequestInfo) -> Self {
        self.state().pull_request = Some(info);
        self
    }

    /// Serve `text` for `path` at `reference` through the contents API.
    pub fn with_file_content(self, reference: &str, path: &str, text: &str) -> Self {
        self.with_entry(reference, path, Self::encoded_file(text))
    }

    pub fn with_entry(self, reference: &str, path: &str, entry: ContentEntry) -> Self {
        self.state()
            .contents
            .insert((reference.to_string(), path.to_string()), entry);
        self
    }

    pub fn with_blob(self, sha: &str, blob: Blob) -> Self {
        self.state().blobs.insert(sha.to_string(), blob);
        self
    }

    /// Serve `text` at the raw-content URL for `path` at `reference`.
    pub fn with_raw(self, pr: &PullRequestRef, reference: &str, path: &str, text: &str) -> Self {
        let url = self.raw_content_url(pr, reference, path);
        self.state().raw.insert(url, text.to_string());
        self
    }

    pub fn with_default_branch(self, branch: &str) -> Self {
        self.state().default_branch = Some(branch.to_string());
        self
    }

    pub fn with_check_runs(self, reference: &str, runs: Vec<CheckRun>) -> Self {
        self.state().check_runs.insert(reference.to_string(), runs);
        self
    }

    /// Delay every content lookup, so concurrent lookups overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `op` fail with `error` on every call.
    pub fn failing(self, op: Operation, error: PlatformError) -> Self {
        self.state().failures.insert(
            op,
            Failure {
                error,
                remaining: None,
            },
        );
        self
    }

    /// Make the next `times` calls of `op` fail with `error`.
    pub fn failing_times(self, op: Operation, times: u32, error: PlatformError) -> Self {
        self.state().failures.insert(
            op,
            Failure {
                error,
                remaining: Some(times),
            },
        );
        self
    }

    // -- inspection ----------------------------------------------------------

    pub fn calls(&self, op: Operation) -> usize {
        self.state().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Call details (path, sha, URL, ...) recorded for `op`, in call order.
    pub fn call_details(&self, op: Operation) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn reviews(&self) -> Vec<(ReviewEvent, String)> {
        self.state().reviews.clone()
    }

    pub fn comments(&self) -> Vec<String> {
        self.state().comments.clone()
    }

    /// Highest number of content lookups observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // -- internals -----------------------------------------------------------

    fn record(&self, op: Operation, detail: impl Into<String>) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.calls.push((op, detail.into()));

        let Some(failure) = state.failures.get_mut(&op) else {
            return Ok(());
        };
        match failure.remaining {
            None => Err(failure.error.clone()),
            Some(0) => Ok(()),
            Some(ref mut n) => {
                *n -= 1;
                Err(failure.error.clone())
            }
        }
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

fn not_found(what: impl std::fmt::Display) -> PlatformError {
    PlatformError::NotFound(what.to_string())
}

#[async_trait]
impl CodeHost for FakeHost {
    async fn list_pull_request_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<PrFileEntry>, PlatformError> {
        self.record(Operation::ListFiles, pr.to_string())?;
        Ok(self.state().files.clone())
    }

    async fn get_pull_request(
        &self,
        pr: &PullRequestRef,
    ) -> Result<PullRequestInfo, PlatformError> {
        self.record(Operation::GetPullRequest, pr.to_string())?;
        self.state()
            .pull_request
            .clone()
            .ok_or_else(|| not_found(pr))
    }

    async fn get_contents(
        &self,
        _pr: &PullRequestRef,
        path: &str,
        reference: &str,
    ) -> Result<ContentEntry, PlatformError> {
        let _slot = self.enter().await;
        self.record(Operation::GetContents, format!("{reference}:{path}"))?;
        self.state()
            .contents
            .get(&(reference.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| not_found(format!("{path}@{reference}")))
    }

    async fn get_blob(&self, _pr: &PullRequestRef, sha: &str) -> Result<Blob, PlatformError> {
        let _slot = self.enter().await;
        self.record(Operation::GetBlob, sha)?;
        self.state()
            .blobs
            .get(sha)
            .cloned()
            .ok_or_else(|| not_found(sha))
    }

    fn raw_content_url(&self, pr: &PullRequestRef, reference: &str, path: &str) -> String {
        format!("fake://raw/{}/{}/{reference}/{path}", pr.owner, pr.repo)
    }

    async fn fetch_raw(&self, url: &str) -> Result<String, PlatformError> {
        let _slot = self.enter().await;
        self.record(Operation::FetchRaw, url)?;
        self.state()
            .raw
            .get(url)
            .cloned()
            .ok_or_else(|| not_found(url))
    }

    async fn get_repository(&self, pr: &PullRequestRef) -> Result<RepositoryInfo, PlatformError> {
        self.record(Operation::GetRepository, pr.full_name())?;
        self.state()
            .default_branch
            .clone()
            .map(|default_branch| RepositoryInfo { default_branch })
            .ok_or_else(|| not_found(pr.full_name()))
    }

    async fn list_check_runs(
        &self,
        _pr: &PullRequestRef,
        reference: &str,
    ) -> Result<Vec<CheckRun>, PlatformError> {
        self.record(Operation::ListCheckRuns, reference)?;
        Ok(self
            .state()
            .check_runs
            .get(reference)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_review(
        &self,
        _pr: &PullRequestRef,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), PlatformError> {
        self.record(Operation::CreateReview, event.as_api_str())?;
        self.state().reviews.push((event, body.to_string()));
        Ok(())
    }

    async fn create_comment(&self, _pr: &PullRequestRef, body: &str) -> Result<(), PlatformError> {
        self.record(Operation::CreateComment, "")?;
        self.state().comments.push(body.to_string());
        Ok(())
    }
}
