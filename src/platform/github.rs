//! GitHub REST API client.
//!
//! Implements [`CodeHost`] over `reqwest`. Authentication uses a bearer
//! token (personal access token or installation token); requests are
//! unauthenticated when no token is configured, which only works for
//! public repositories and low request volumes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{
    Blob, CheckRun, CodeHost, ContentEntry, EntryKind, PlatformError, PrFileEntry,
    PullRequestInfo, RepositoryInfo, ReviewEvent,
};
use crate::config::GithubConfig;
use crate::models::PullRequestRef;

/// Page size for list endpoints (GitHub maximum).
const PER_PAGE: usize = 100;

/// The PR files endpoint stops at 3000 files (30 pages).
const MAX_PAGES: usize = 30;

/// Per-request transport timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Deserialize)]
struct RawRepo {
    full_name: String,
}

#[derive(Deserialize)]
struct RawHead {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
    #[serde(default)]
    repo: Option<RawRepo>,
}

#[derive(Deserialize)]
struct RawPull {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    head: RawHead,
}

#[derive(Deserialize)]
struct RawBlob {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct RawRepository {
    default_branch: String,
}

#[derive(Deserialize)]
struct RawCheckRuns {
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

/// GitHub implementation of [`CodeHost`].
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    raw_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_url", &self.api_url)
            .field("raw_url", &self.raw_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::constants::USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            raw_url: config.raw_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn api(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        build_url(&self.api_url, segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, PlatformError> {
        let response = builder
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(PlatformError::from_status(status, &body));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, PlatformError> {
        let response = self.send(self.request(Method::GET, url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn post_json(&self, url: Url, payload: &serde_json::Value) -> Result<(), PlatformError> {
        self.send(self.request(Method::POST, url).json(payload))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl CodeHost for GithubClient {
    async fn list_pull_request_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<PrFileEntry>, PlatformError> {
        let number = pr.number.to_string();
        let mut files = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut url = self.api(&["repos", &pr.owner, &pr.repo, "pulls", &number, "files"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let batch: Vec<PrFileEntry> = self.get_json(url).await?;
            let done = batch.len() < PER_PAGE;
            files.extend(batch);
            if done {
                break;
            }
        }

        Ok(files)
    }

    async fn get_pull_request(
        &self,
        pr: &PullRequestRef,
    ) -> Result<PullRequestInfo, PlatformError> {
        let url = self.api(&["repos", &pr.owner, &pr.repo, "pulls", &pr.number.to_string()])?;
        let raw: RawPull = self.get_json(url).await?;
        Ok(PullRequestInfo {
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            author: raw.user.map(|u| u.login),
            head_branch: raw.head.branch,
            head_sha: raw.head.sha,
            head_repo: raw.head.repo.map(|r| r.full_name),
        })
    }

    async fn get_contents(
        &self,
        pr: &PullRequestRef,
        path: &str,
        reference: &str,
    ) -> Result<ContentEntry, PlatformError> {
        let mut segments = vec!["repos", pr.owner.as_str(), pr.repo.as_str(), "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.api(&segments)?;
        url.query_pairs_mut().append_pair("ref", reference);

        let value: serde_json::Value = self.get_json(url).await?;
        parse_content_entry(&value)
    }

    async fn get_blob(&self, pr: &PullRequestRef, sha: &str) -> Result<Blob, PlatformError> {
        let url = self.api(&["repos", &pr.owner, &pr.repo, "git", "blobs", sha])?;
        let raw: RawBlob = self.get_json(url).await?;
        Ok(Blob {
            content: raw.content,
            encoding: raw.encoding,
        })
    }

    fn raw_content_url(&self, pr: &PullRequestRef, reference: &str, path: &str) -> String {
        let mut segments = vec![pr.owner.as_str(), pr.repo.as_str(), reference];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        match build_url(&self.raw_url, &segments) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}/{}/{}/{}/{}",
                self.raw_url, pr.owner, pr.repo, reference, path
            ),
        }
    }

    async fn fetch_raw(&self, url: &str) -> Result<String, PlatformError> {
        let url = Url::parse(url)
            .map_err(|e| PlatformError::Decode(format!("invalid raw URL '{url}': {e}")))?;
        let mut builder = self.http.get(url);
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }
        let response = self.send(builder).await?;
        response
            .text()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))
    }

    async fn get_repository(&self, pr: &PullRequestRef) -> Result<RepositoryInfo, PlatformError> {
        let url = self.api(&["repos", &pr.owner, &pr.repo])?;
        let raw: RawRepository = self.get_json(url).await?;
        Ok(RepositoryInfo {
            default_branch: raw.default_branch,
        })
    }

    async fn list_check_runs(
        &self,
        pr: &PullRequestRef,
        reference: &str,
    ) -> Result<Vec<CheckRun>, PlatformError> {
        let mut runs = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut url =
                self.api(&["repos", &pr.owner, &pr.repo, "commits", reference, "check-runs"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let batch: RawCheckRuns = self.get_json(url).await?;
            let done = batch.check_runs.len() < PER_PAGE;
            runs.extend(batch.check_runs);
            if done {
                break;
            }
        }

        Ok(runs)
    }

    async fn create_review(
        &self,
        pr: &PullRequestRef,
        event: ReviewEvent,
        body: &str,
    ) -> Result<(), PlatformError> {
        let url = self.api(&[
            "repos",
            &pr.owner,
            &pr.repo,
            "pulls",
            &pr.number.to_string(),
            "reviews",
        ])?;
        let payload = serde_json::json!({
            "event": event.as_api_str(),
            "body": body,
        });
        self.post_json(url, &payload).await
    }

    async fn create_comment(&self, pr: &PullRequestRef, body: &str) -> Result<(), PlatformError> {
        let url = self.api(&[
            "repos",
            &pr.owner,
            &pr.repo,
            "issues",
            &pr.number.to_string(),
            "comments",
        ])?;
        self.post_json(url, &serde_json::json!({ "body": body })).await
    }
}

/// Append percent-encoded path segments to a base URL.
fn build_url(base: &str, segments: &[&str]) -> Result<Url, PlatformError> {
    let mut url = Url::parse(base)
        .map_err(|e| PlatformError::Decode(format!("invalid base URL '{base}': {e}")))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| PlatformError::Decode(format!("base URL cannot be a base: {base}")))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

/// Interpret a contents-API response.
///
/// Directories come back as a JSON array; everything else is an object
/// with a `type` field.
fn parse_content_entry(value: &serde_json::Value) -> Result<ContentEntry, PlatformError> {
    if value.is_array() {
        return Ok(ContentEntry {
            kind: EntryKind::Dir,
            content: None,
            encoding: None,
        });
    }

    let kind = match value.get("type").and_then(|t| t.as_str()) {
        Some("file") => EntryKind::File,
        Some("dir") => EntryKind::Dir,
        Some("symlink") => EntryKind::Symlink,
        Some("submodule") => EntryKind::Submodule,
        other => {
            return Err(PlatformError::Decode(format!(
                "unknown contents entry type: {other:?}"
            )));
        }
    };

    Ok(ContentEntry {
        kind,
        content: value
            .get("content")
            .and_then(|c| c.as_str())
            .map(String::from),
        encoding: value
            .get("encoding")
            .and_then(|e| e.as_str())
            .map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GithubConfig;

    fn client() -> GithubClient {
        GithubClient::new(&GithubConfig {
            token: Some("ghp_secret".into()),
            ..GithubConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn build_url_encodes_segments() {
        let url = build_url(
            "https://api.github.com",
            &["repos", "acme", "widgets", "contents", "docs", "my file.md"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/contents/docs/my%20file.md"
        );
    }

    #[test]
    fn build_url_keeps_base_path() {
        let url = build_url("https://ghe.example.com/api/v3/", &["repos", "o", "r"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/o/r");
    }

    #[test]
    fn raw_url_layout() {
        let pr = PullRequestRef::new("acme", "widgets", 3);
        let url = client().raw_content_url(&pr, "abc123", "src/app.ts");
        assert_eq!(
            url,
            "https://raw.githubusercontent.com/acme/widgets/abc123/src/app.ts"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("ghp_secret"));
    }

    #[test]
    fn parse_file_entry() {
        let value = serde_json::json!({
            "type": "file",
            "content": "aGVsbG8=\n",
            "encoding": "base64",
        });
        let entry = parse_content_entry(&value).unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.content.as_deref(), Some("aGVsbG8=\n"));
        assert_eq!(entry.encoding.as_deref(), Some("base64"));
    }

    #[test]
    fn parse_directory_listing() {
        let value = serde_json::json!([{ "type": "file", "name": "a" }]);
        assert_eq!(parse_content_entry(&value).unwrap().kind, EntryKind::Dir);
    }

    #[test]
    fn parse_submodule_and_unknown() {
        let value = serde_json::json!({ "type": "submodule" });
        assert_eq!(
            parse_content_entry(&value).unwrap().kind,
            EntryKind::Submodule
        );
        let value = serde_json::json!({ "type": "weird" });
        assert!(parse_content_entry(&value).is_err());
    }

    #[test]
    fn pull_request_payload_deserializes() {
        let raw: RawPull = serde_json::from_value(serde_json::json!({
            "title": "Fix docs",
            "body": null,
            "user": { "login": "octocat" },
            "head": {
                "ref": "fix-docs",
                "sha": "0123456789abcdef0123456789abcdef01234567",
                "repo": { "full_name": "octocat/widgets" }
            }
        }))
        .unwrap();
        assert_eq!(raw.head.branch, "fix-docs");
        assert_eq!(raw.user.unwrap().login, "octocat");
        assert!(raw.body.is_none());
        assert_eq!(raw.head.repo.unwrap().full_name, "octocat/widgets");
    }
}
