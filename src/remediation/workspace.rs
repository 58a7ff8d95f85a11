//! Temporary git working copy.
//!
//! Shells out to `git` via `tokio::process::Command`. A [`Workspace`] owns
//! its temporary directory: dropping it (or calling [`Workspace::close`])
//! deletes the clone on every exit path.

use std::path::Path;
use std::process::Output;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::retry::{Classify, ErrorKind};

/// Errors from git invocations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(String),

    #[error("git {command} failed (exit {code}): {stderr}")]
    Command {
        command: String,
        code: String,
        stderr: String,
        kind: ErrorKind,
    },

    #[error("workspace error: {0}")]
    Io(String),
}

impl Classify for GitError {
    fn kind(&self) -> ErrorKind {
        match self {
            GitError::Command { kind, .. } => *kind,
            _ => ErrorKind::Fatal,
        }
    }
}

/// Classify git's stderr the same way HTTP responses are classified.
fn classify_stderr(stderr: &str) -> ErrorKind {
    let lower = stderr.to_lowercase();
    if lower.contains("rate limit") {
        ErrorKind::RateLimited
    } else if lower.contains("429") || lower.contains("too many requests") {
        ErrorKind::TooManyRequests
    } else if lower.contains("not found") || lower.contains("couldn't find remote ref") {
        ErrorKind::NotFound
    } else {
        ErrorKind::Fatal
    }
}

/// Credential for git over HTTPS.
///
/// Sent as a per-command `http.extraHeader` so it is never written into
/// the remote URL or `.git/config`.
#[derive(Clone, Default)]
pub struct GitAuth {
    token: Option<String>,
}

impl std::fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitAuth")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl GitAuth {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn encoded(&self) -> Option<String> {
        self.token
            .as_ref()
            .map(|t| BASE64.encode(format!("x-access-token:{t}")))
    }

    fn config_args(&self) -> Vec<String> {
        match self.encoded() {
            Some(encoded) => vec![
                "-c".to_string(),
                format!("http.extraHeader=AUTHORIZATION: basic {encoded}"),
            ],
            None => Vec::new(),
        }
    }

    /// Replace any trace of the credential in `text`.
    fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        if let Some(ref token) = self.token {
            out = out.replace(token, "***");
        }
        if let Some(encoded) = self.encoded() {
            out = out.replace(&encoded, "***");
        }
        out
    }
}

/// Run one git command in `dir`.
///
/// `command` names the subcommand for error messages; arguments are never
/// echoed since they may carry the credential header.
async fn git(dir: &Path, auth: &GitAuth, command: &str, args: &[&str]) -> Result<Output, GitError> {
    debug!(command, dir = %dir.display(), "running git");
    tokio::process::Command::new("git")
        .args(auth.config_args())
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .await
        .map_err(|e| GitError::Spawn(e.to_string()))
}

fn check(auth: &GitAuth, command: &str, output: Output) -> Result<Output, GitError> {
    if output.status.success() {
        return Ok(output);
    }
    let stderr = auth.redact(String::from_utf8_lossy(&output.stderr).trim());
    Err(GitError::Command {
        command: command.to_string(),
        code: output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string()),
        kind: classify_stderr(&stderr),
        stderr,
    })
}

/// Shallow clone in a private temporary directory.
pub struct Workspace {
    dir: Option<TempDir>,
    auth: GitAuth,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("path", &self.dir.as_ref().map(|d| d.path().to_path_buf()))
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// `git clone --depth 1` of `url` into a fresh temporary directory.
    ///
    /// On failure the directory is removed before returning.
    pub async fn clone_shallow(url: &str, auth: GitAuth) -> Result<Self, GitError> {
        let dir = tempfile::Builder::new()
            .prefix("pullwarden-")
            .tempdir()
            .map_err(|e| GitError::Io(format!("failed to create temp dir: {e}")))?;

        let target = dir.path().to_string_lossy().to_string();
        let output = git(
            dir.path(),
            &auth,
            "clone",
            &["clone", "--quiet", "--depth", "1", url, &target],
        )
        .await?;
        check(&auth, "clone", output)?;

        Ok(Self {
            dir: Some(dir),
            auth,
        })
    }

    /// Root of the working copy.
    pub fn path(&self) -> &Path {
        match self.dir {
            Some(ref dir) => dir.path(),
            None => Path::new(""),
        }
    }

    async fn run(&self, command: &str, args: &[&str]) -> Result<Output, GitError> {
        let output = git(self.path(), &self.auth, command, args).await?;
        check(&self.auth, command, output)
    }

    /// Fetch `branch` from origin and check it out under the same name.
    pub async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run("fetch", &["fetch", "--quiet", "--depth", "1", "origin", branch]).await?;
        self.run("checkout", &["checkout", "--quiet", "-B", branch, "FETCH_HEAD"]).await?;
        Ok(())
    }

    /// Stage everything; returns whether the index now differs from HEAD.
    pub async fn stage_all(&self) -> Result<bool, GitError> {
        self.run("add", &["add", "-A"]).await?;
        let output = git(self.path(), &self.auth, "diff", &["diff", "--cached", "--quiet"]).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => check(&self.auth, "diff", output).map(|_| false),
        }
    }

    /// Whether the working tree differs from the index, untracked files
    /// included.
    pub async fn has_unstaged_changes(&self) -> Result<bool, GitError> {
        let output = self.run("status", &["status", "--porcelain"]).await?;
        let status = String::from_utf8_lossy(&output.stdout);
        Ok(status.lines().any(|line| {
            line.starts_with("??") || line.as_bytes().get(1).is_some_and(|b| *b != b' ')
        }))
    }

    /// Commit the index with the given identity.
    pub async fn commit(&self, name: &str, email: &str, message: &str) -> Result<(), GitError> {
        let name = format!("user.name={name}");
        let email = format!("user.email={email}");
        self.run(
            "commit",
            &[
                "-c",
                &name,
                "-c",
                &email,
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                message,
            ],
        )
        .await?;
        Ok(())
    }

    /// Push HEAD to `branch` on origin.
    pub async fn push(&self, branch: &str) -> Result<(), GitError> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.run("push", &["push", "--quiet", "origin", &refspec]).await?;
        Ok(())
    }

    /// Delete the working copy now, reporting failure.
    pub fn close(mut self) -> Result<(), GitError> {
        match self.dir.take() {
            Some(dir) => dir
                .close()
                .map_err(|e| GitError::Io(format!("failed to remove working copy: {e}"))),
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                warn!(path = %path, error = %e, "failed to remove working copy");
            }
        }
    }
}
