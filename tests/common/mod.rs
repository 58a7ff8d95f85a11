//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, fmt};

use pullwarden::models::PullRequestRef;
use pullwarden::platform::{CheckRun, PullRequestInfo};
use pullwarden::retry::{RecordingSleeper, RetryExecutor, RetryPolicy};

pub fn init_test_logging() {
    let _ = fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("pullwarden=debug".parse().unwrap()),
        )
        .try_init();
}

/// Log output collected from the current thread while installed.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Route this thread's events into the buffer until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured lines containing every one of `needles`.
    pub fn lines_with(&self, needles: &[&str]) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|line| needles.iter().all(|n| line.contains(n)))
            .map(str::to_string)
            .collect()
    }
}

pub fn pr() -> PullRequestRef {
    PullRequestRef::new("acme", "widgets", 7)
}

pub const HEAD_SHA: &str = "0123456789abcdef0123456789abcdef01234567";

pub fn pr_info(author: &str) -> PullRequestInfo {
    PullRequestInfo {
        title: "Update widgets".into(),
        body: "Small change".into(),
        author: Some(author.into()),
        head_branch: "feature".into(),
        head_sha: HEAD_SHA.into(),
        head_repo: None,
    }
}

pub fn green(name: &str) -> CheckRun {
    CheckRun {
        name: name.into(),
        status: "completed".into(),
        conclusion: Some("success".into()),
    }
}

pub fn failed(name: &str) -> CheckRun {
    CheckRun {
        name: name.into(),
        status: "completed".into(),
        conclusion: Some("failure".into()),
    }
}

/// A retry executor that records backoff delays instead of sleeping.
pub fn recording_retry() -> (RetryExecutor, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let retry = RetryExecutor::with_sleeper(RetryPolicy::default(), sleeper.clone());
    (retry, sleeper)
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A bare origin at `<root>/<owner>/<repo>.git` whose `branch` holds `files`.
///
/// Every push received after setup is counted by a `pre-receive` hook.
pub struct Origin {
    pub root: TempDir,
    pub bare: PathBuf,
}

const PUSH_LOG: &str = "pushes.log";

impl Origin {
    pub fn new(full_name: &str, branch: &str, files: &[(&str, &str)]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let bare = root.path().join(format!("{full_name}.git"));
        std::fs::create_dir_all(&bare).unwrap();
        git(&bare, &["init", "--quiet", "--bare"]);
        git(&bare, &["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")]);

        let work = tempfile::tempdir().unwrap();
        git(work.path(), &["init", "--quiet"]);
        for (path, content) in files {
            let target = work.path().join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, content).unwrap();
        }
        git(work.path(), &["add", "-A"]);
        git(work.path(), &["commit", "--quiet", "-m", "initial"]);
        git(
            work.path(),
            &[
                "push",
                "--quiet",
                bare.to_str().unwrap(),
                &format!("HEAD:refs/heads/{branch}"),
            ],
        );

        let hook = bare.join("hooks").join("pre-receive");
        let log = bare.join(PUSH_LOG);
        std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
        std::fs::write(
            &hook,
            format!("#!/bin/sh\ncat >/dev/null\necho push >> '{}'\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { root, bare }
    }

    /// Pushes received since setup, rejected ones included.
    pub fn pushes(&self) -> usize {
        std::fs::read_to_string(self.bare.join(PUSH_LOG))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    /// Base URL to use as the git remote prefix.
    pub fn git_url(&self) -> String {
        format!("file://{}", self.root.path().display())
    }

    pub fn show(&self, branch: &str, path: &str) -> String {
        git(&self.bare, &["show", &format!("{branch}:{path}")])
    }

    pub fn commit_count(&self, branch: &str) -> usize {
        git(&self.bare, &["rev-list", "--count", branch])
            .trim()
            .parse()
            .unwrap()
    }

    pub fn last_author(&self, branch: &str) -> String {
        git(&self.bare, &["log", "-1", "--format=%an <%ae>", branch])
            .trim()
            .to_string()
    }
}
