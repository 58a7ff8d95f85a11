//! Integration tests for pull request context acquisition.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pretty_assertions::assert_eq;

use pullwarden::fetch::{FetchSettings, FileFetcher};
use pullwarden::models::ContentTier;
use pullwarden::platform::fakes::{FakeHost, Operation};
use pullwarden::platform::{Blob, ContentEntry, EntryKind, PlatformError};

use common::{HEAD_SHA, LogCapture, pr, pr_info, recording_retry};

fn fetcher(host: Arc<FakeHost>, settings: FetchSettings) -> FileFetcher {
    let (retry, _) = recording_retry();
    FileFetcher::new(host, retry, settings)
}

fn content_calls(host: &FakeHost) -> usize {
    host.calls(Operation::GetContents)
        + host.calls(Operation::GetBlob)
        + host.calls(Operation::FetchRaw)
}

#[tokio::test]
async fn content_fetches_never_exceed_the_cap() {
    common::init_test_logging();
    let mut host = FakeHost::new()
        .with_pull_request(pr_info("octocat"))
        .with_latency(Duration::from_millis(20));
    let mut entries = Vec::new();
    for i in 0..12 {
        let path = format!("src/module_{i}.ts");
        host = host.with_file_content(HEAD_SHA, &path, &format!("export const n = {i};"));
        entries.push(FakeHost::file_entry(&path, "modified", 3, 1));
    }
    let host = Arc::new(host.with_files(entries));

    let ctx = fetcher(host.clone(), FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    assert_eq!(ctx.fetched_count(), 12);
    assert_eq!(ctx.files[7].content, "export const n = 7;");
    assert!(host.max_in_flight() <= 5, "saw {} in flight", host.max_in_flight());
    assert!(host.max_in_flight() > 1, "fetches should overlap");
}

#[tokio::test]
async fn configured_cap_is_respected() {
    let mut host = FakeHost::new()
        .with_pull_request(pr_info("octocat"))
        .with_latency(Duration::from_millis(10));
    let mut entries = Vec::new();
    for i in 0..6 {
        let path = format!("lib/{i}.py");
        host = host.with_file_content(HEAD_SHA, &path, "pass");
        entries.push(FakeHost::file_entry(&path, "added", 1, 0));
    }
    let host = Arc::new(host.with_files(entries));

    let settings = FetchSettings {
        max_concurrent: 2,
        ..FetchSettings::default()
    };
    let ctx = fetcher(host.clone(), settings).fetch_context(&pr()).await.unwrap();

    assert_eq!(ctx.fetched_count(), 6);
    assert!(host.max_in_flight() <= 2);
}

#[tokio::test]
async fn ineligible_files_cause_no_content_requests() {
    let host = Arc::new(
        FakeHost::new()
            .with_pull_request(pr_info("octocat"))
            .with_files(vec![
                FakeHost::file_entry("README.md", "modified", 4, 2),
                FakeHost::file_entry("assets/logo.png", "added", 0, 0),
                FakeHost::file_entry("src/generated.ts", "modified", 900, 100),
                FakeHost::file_entry("Makefile", "modified", 1, 1),
            ]),
    );

    let ctx = fetcher(host.clone(), FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    assert_eq!(ctx.files.len(), 4);
    assert_eq!(ctx.fetched_count(), 0);
    assert_eq!(content_calls(&host), 0);
    assert!(ctx.files.iter().all(|f| f.source_tier.is_none()));
}

#[tokio::test]
async fn falls_through_to_default_branch() {
    let host = Arc::new(
        FakeHost::new()
            .with_pull_request(pr_info("octocat"))
            .with_files(vec![FakeHost::file_entry("src/moved.ts", "renamed", 2, 2)])
            .with_default_branch("main")
            .with_file_content("main", "src/moved.ts", "export {};"),
    );

    let ctx = fetcher(host.clone(), FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    let file = &ctx.files[0];
    assert_eq!(file.content, "export {};");
    assert_eq!(file.source_tier, Some(ContentTier::DefaultBranch));
    assert!(host.calls(Operation::FetchRaw) > 0);
    assert_eq!(host.calls(Operation::GetBlob), 0);
    assert!(
        host.call_details(Operation::GetContents)
            .contains(&"main:src/moved.ts".to_string())
    );
}

#[tokio::test]
async fn failed_tiers_are_logged_and_skipped() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let mut entry = FakeHost::file_entry("src/moved.ts", "renamed", 2, 2);
    entry.sha = Some("fedcba9876543210fedcba9876543210fedcba98".into());
    let host = Arc::new(
        FakeHost::new()
            .with_pull_request(pr_info("octocat"))
            .with_files(vec![entry])
            .with_default_branch("main")
            .with_file_content("main", "src/moved.ts", "export {};"),
    );

    let ctx = fetcher(host, FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    assert_eq!(ctx.files[0].source_tier, Some(ContentTier::DefaultBranch));
    for tier in ["tier=head-ref", "tier=blob", "tier=raw-url"] {
        let failed = logs.lines_with(&["WARN", "content tier failed", "src/moved.ts", tier]);
        assert_eq!(failed.len(), 1, "{tier}: {failed:?}");
    }
    assert!(logs.lines_with(&["content tier failed", "tier=default-branch"]).is_empty());
    assert!(logs.lines_with(&["content unavailable from every tier"]).is_empty());
}

#[tokio::test]
async fn file_missing_everywhere_is_logged_once_and_kept() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let host = Arc::new(
        FakeHost::new()
            .with_pull_request(pr_info("octocat"))
            .with_files(vec![
                FakeHost::file_entry("src/gone.ts", "removed", 0, 4),
                FakeHost::file_entry("src/kept.ts", "modified", 1, 1),
            ])
            .with_file_content(HEAD_SHA, "src/kept.ts", "export const kept = 1;"),
    );

    let ctx = fetcher(host, FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    assert_eq!(ctx.files.len(), 2);
    assert!(ctx.files[0].content.is_empty());
    assert_eq!(ctx.files[0].source_tier, None);
    assert_eq!(ctx.files[1].source_tier, Some(ContentTier::HeadRef));
    assert_eq!(logs.lines_with(&["WARN", "content tier failed", "src/gone.ts"]).len(), 3);
    let unavailable = logs.lines_with(&["INFO", "content unavailable from every tier"]);
    assert_eq!(unavailable.len(), 1);
    assert!(unavailable[0].contains("src/gone.ts"));
}

#[tokio::test]
async fn blob_tier_serves_files_missing_at_head() {
    let blob_sha = "fedcba9876543210fedcba9876543210fedcba98";
    let mut entry = FakeHost::file_entry("src/util.rs", "modified", 1, 1);
    entry.sha = Some(blob_sha.into());
    let host = Arc::new(
        FakeHost::new()
            .with_pull_request(pr_info("octocat"))
            .with_files(vec![entry])
            .with_blob(
                blob_sha,
                Blob {
                    content: BASE64.encode("pub fn util() {}\n"),
                    encoding: Some("base64".into()),
                },
            ),
    );

    let ctx = fetcher(host.clone(), FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    assert_eq!(ctx.files[0].content, "pub fn util() {}\n");
    assert_eq!(ctx.files[0].source_tier, Some(ContentTier::Blob));
    assert_eq!(host.calls(Operation::FetchRaw), 0);
}

#[tokio::test]
async fn oversized_api_payload_falls_back_to_raw_url() {
    let pr = pr();
    let host = FakeHost::new()
        .with_pull_request(pr_info("octocat"))
        .with_files(vec![FakeHost::file_entry("src/big.js", "modified", 10, 0)])
        .with_entry(
            HEAD_SHA,
            "src/big.js",
            ContentEntry {
                kind: EntryKind::File,
                content: Some(String::new()),
                encoding: Some("none".into()),
            },
        );
    let host = Arc::new(host.with_raw(&pr, HEAD_SHA, "src/big.js", "const big = 1;"));

    let ctx = fetcher(host, FetchSettings::default())
        .fetch_context(&pr)
        .await
        .unwrap();

    assert_eq!(ctx.files[0].content, "const big = 1;");
    assert_eq!(ctx.files[0].source_tier, Some(ContentTier::RawUrl));
}

#[tokio::test]
async fn directory_at_path_is_not_content() {
    let host = Arc::new(
        FakeHost::new()
            .with_pull_request(pr_info("octocat"))
            .with_files(vec![FakeHost::file_entry("src/vendor.go", "modified", 1, 0)])
            .with_entry(
                HEAD_SHA,
                "src/vendor.go",
                ContentEntry {
                    kind: EntryKind::Dir,
                    content: None,
                    encoding: None,
                },
            ),
    );

    let ctx = fetcher(host, FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    assert!(ctx.files[0].content.is_empty());
    assert_eq!(ctx.files[0].source_tier, None);
}

#[tokio::test]
async fn rate_limited_listing_is_retried_with_backoff() {
    let (retry, sleeper) = recording_retry();
    let host = Arc::new(
        FakeHost::new()
            .with_pull_request(pr_info("octocat"))
            .with_files(vec![FakeHost::file_entry("docs/guide.md", "modified", 1, 0)])
            .failing_times(
                Operation::ListFiles,
                2,
                PlatformError::RateLimited("API rate limit exceeded".into()),
            ),
    );

    let ctx = FileFetcher::new(host.clone(), retry, FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap();

    assert_eq!(ctx.files.len(), 1);
    assert_eq!(host.calls(Operation::ListFiles), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

#[tokio::test]
async fn listing_gives_up_after_max_attempts() {
    let (retry, sleeper) = recording_retry();
    let host = Arc::new(FakeHost::new().failing(
        Operation::ListFiles,
        PlatformError::Http {
            status: 429,
            message: "slow down".into(),
        },
    ));

    let err = FileFetcher::new(host.clone(), retry, FetchSettings::default())
        .fetch_context(&pr())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("slow down"));
    assert_eq!(host.calls(Operation::ListFiles), 3);
    assert_eq!(sleeper.delays().len(), 2);
}
