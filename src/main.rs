//! pullwarden: automated pull request review gate.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use pullwarden::config;
use pullwarden::constants;
use pullwarden::env;
use pullwarden::models;
use pullwarden::orchestrator;
use pullwarden::platform;
use pullwarden::providers;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use cli::args::{Cli, Command, FixArgs, ReviewArgs, TargetArgs};
use config::Config;
use env::Env;
use models::PullRequestRef;
use orchestrator::{CycleOptions, ReviewCycle};
use platform::github::GithubClient;
use providers::{FileReviewProvider, ReviewProvider, StaticReviewProvider};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(cli.log_json, cli.log_level);

    match cli.command {
        Command::Review(args) => run_review(args).await,
        Command::Fetch(args) => run_fetch(args).await,
        Command::Fix(args) => run_fix(args).await,
        Command::Version => run_version(),
    }
}

/// Print version information.
fn run_version() -> Result<()> {
    use colored::Colorize;

    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        constants::VERSION.green().bold()
    );
    Ok(())
}

/// Resolve the target PR, load config and build a review cycle around it.
fn prepare(
    target: &TargetArgs,
    provider: Arc<dyn ReviewProvider>,
) -> Result<(PullRequestRef, Config, ReviewCycle)> {
    let pr = target.pull_request().map_err(|e| anyhow!(e))?;

    let repo_root = match target.path {
        Some(ref path) => path.clone(),
        None => std::env::current_dir().context("failed to determine current directory")?,
    };
    let config =
        Config::load(Some(&repo_root), &Env::real()).context("failed to load configuration")?;
    if config.github.token.is_none() {
        tracing::warn!("no GitHub token configured; requests are unauthenticated");
    }

    let host = Arc::new(
        GithubClient::new(&config.github).context("failed to create GitHub client")?,
    );
    let cycle = ReviewCycle::new(host, provider, &config);
    Ok((pr, config, cycle))
}

/// Run the full cycle and render the report to stdout.
async fn run_review(args: ReviewArgs) -> Result<()> {
    let (pr, config, cycle) = prepare(
        &args.target,
        Arc::new(FileReviewProvider::new(&args.review_file)),
    )?;

    let options = CycleOptions {
        post: !args.no_post,
        remediate: config.remediation.enabled || args.fix,
    };
    let report = cycle
        .run(&pr, options)
        .await
        .with_context(|| format!("review of {pr} failed"))?;

    print!("{}", args.format.render(&report));
    Ok(())
}

/// Fetch the PR context and print it as JSON.
async fn run_fetch(args: TargetArgs) -> Result<()> {
    let (pr, _config, cycle) = prepare(&args, Arc::new(StaticReviewProvider::default()))?;
    let ctx = cycle
        .fetch_context(&pr)
        .await
        .with_context(|| format!("failed to fetch {pr}"))?;

    tracing::info!(
        pr = %pr,
        files = ctx.files.len(),
        fetched = ctx.fetched_count(),
        changes = ctx.total_changes(),
        "context fetched"
    );
    let json = serde_json::to_string_pretty(&ctx).context("failed to serialize context")?;
    println!("{json}");
    Ok(())
}

/// Apply automated fixes for the issues listed in a review file.
async fn run_fix(args: FixArgs) -> Result<()> {
    use colored::Colorize;

    let review = FileReviewProvider::new(&args.review_file)
        .load()
        .await
        .with_context(|| format!("failed to load review from {}", args.review_file.display()))?;
    let provider = Arc::new(StaticReviewProvider::new(review.clone()));
    let (pr, _config, cycle) = prepare(&args.target, provider)?;

    let outcome = cycle.remediate(&pr, &review).await;
    if outcome.succeeded {
        println!(
            " {} {} fix(es) pushed to {pr}",
            "✔".green(),
            outcome.fixed_count
        );
        for applied in &outcome.applied {
            println!("   - {applied}");
        }
        return Ok(());
    }

    match outcome.error {
        Some(error) => Err(anyhow!(error))
            .with_context(|| format!("auto-fix of {pr} failed at stage {}", outcome.stage)),
        None => {
            println!(" {} no fixes applied to {pr}", "ℹ".blue());
            Ok(())
        }
    }
}
