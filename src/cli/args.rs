//! Clap argument types and validation.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use pullwarden::models::PullRequestRef;
use pullwarden::orchestrator::CycleReport;

/// Automated pull request review gate.
#[derive(Parser, Debug)]
#[command(
    name = "pullwarden",
    version = pullwarden::constants::VERSION,
    about = "Fetch, review, approve and auto-fix GitHub pull requests",
)]
pub struct Cli {
    /// Default log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    /// Emit logs as newline-delimited JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run a full review cycle on a pull request.
    Review(ReviewArgs),

    /// Fetch a pull request's changed files and print the context as JSON.
    Fetch(TargetArgs),

    /// Run the auto-fix pipeline for the fixable issues of a review.
    Fix(FixArgs),

    /// Print version information.
    Version,
}

/// Which pull request to work on.
#[derive(Parser, Debug, Clone)]
pub struct TargetArgs {
    /// Repository as `owner/repo`.
    #[arg(long)]
    pub repo: String,

    /// Pull request number.
    #[arg(long)]
    pub pr: u64,

    /// Repository root to look for `.pullwarden.toml` in (defaults to cwd).
    #[arg(long)]
    pub path: Option<PathBuf>,
}

impl TargetArgs {
    /// Parse the target into a pull request reference.
    pub fn pull_request(&self) -> Result<PullRequestRef, String> {
        PullRequestRef::parse(&self.repo, self.pr)
    }
}

/// Arguments for the `review` subcommand.
#[derive(Parser, Debug)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Reviewer output to use (JSON object or issue array, optionally fenced).
    #[arg(long)]
    pub review_file: PathBuf,

    /// Do not post the verdict to the pull request.
    #[arg(long, default_value_t = false)]
    pub no_post: bool,

    /// Run the auto-fix pipeline even when disabled in config.
    #[arg(long, default_value_t = false)]
    pub fix: bool,

    /// Output format.
    #[arg(long, default_value = "terminal")]
    pub format: OutputFormat,
}

/// Arguments for the `fix` subcommand.
#[derive(Parser, Debug)]
pub struct FixArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Reviewer output listing the issues to fix.
    #[arg(long)]
    pub review_file: PathBuf,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Terminal,
    Json,
}

impl OutputFormat {
    /// Render a cycle report using the renderer for this format.
    pub fn render(&self, report: &CycleReport) -> String {
        use pullwarden::output::OutputRenderer;
        match self {
            OutputFormat::Terminal => pullwarden::output::terminal::TerminalRenderer.render(report),
            OutputFormat::Json => pullwarden::output::json::JsonRenderer.render(report),
        }
    }
}
