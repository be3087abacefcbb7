//! Dockyard Runner CLI
//!
//! Dispatches the build requests of one CI invocation and runs each of them
//! through the build pipeline.
//!
//! The requests come from an explicit Dockerfile, a pull request (selected by
//! a `refs/pull/<n>/merge` ref) or the files touched by a commit. Exits with
//! status 1 when dispatch is rejected or any run fails.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use dockyard_client::{AdvisoryClient, GitHubClient, GitHubReporter};
use dockyard_core::domain::change::PullRequestFiles;
use dockyard_core::domain::log::LogLevel;
use dockyard_core::domain::request::BuildRequest;
use dockyard_core::{ChangeExtractor, DispatchConfig, Reporter};
use dockyard_runner::config::Config;
use dockyard_runner::pipeline::RunSummary;
use dockyard_runner::podman::{PodmanImageStore, check_podman_available};
use dockyard_runner::source::{DispatchSource, commit_batch, file_request};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dockyard-runner")]
#[command(about = "Build, test and publish container recipes", long_about = None)]
struct Cli {
    /// Dockerfile to build, as <container>/<version>/Dockerfile
    #[arg(long)]
    file: Option<PathBuf>,

    /// Commit SHA whose changes are built
    #[arg(long, env = "GITHUB_SHA")]
    commit: Option<String>,

    /// Git ref; refs/pull/<n>/merge builds pull request <n>
    #[arg(long = "ref", env = "GITHUB_REF")]
    git_ref: Option<String>,

    /// Dry run: build and test, publish nothing
    #[arg(long)]
    dry: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dockyard_runner=info,dockyard_core=info,dockyard_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Dockyard Runner");

    let mut config = Config::from_env().context("Failed to load configuration")?;
    config.dry_run |= cli.dry;
    config.validate()?;
    info!(
        "Loaded configuration: workdir={}, namespace={}, dry_run={}",
        config.workdir.display(),
        config.namespace,
        config.dry_run
    );

    check_podman_available()?;

    let github = GitHubClient::new(
        config.github_api_url.clone(),
        config.github_repository.clone(),
        config.github_token.clone(),
    );
    let reporter = Arc::new(GitHubReporter::new(github.clone()));
    if !reporter.is_enabled() {
        warn!("No source-hosting token, statuses and comments are only logged");
    }

    let source = DispatchSource::resolve(cli.file, cli.commit, cli.git_ref.as_deref())?;
    let requests = match collect_requests(&config, &github, reporter.clone(), source).await {
        Ok(requests) => requests,
        Err(e) => {
            error!("Dispatch failed: {:#}", e);
            println!("{} {:#}", "✗ Dispatch rejected:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if requests.is_empty() {
        info!("Nothing to build");
        println!("{}", "No container modified, nothing to build".dimmed());
        return Ok(());
    }

    let config = Arc::new(config);
    let pipeline = dockyard_runner::configured_pipeline(
        config,
        Arc::new(PodmanImageStore::new()),
        reporter,
        Arc::new(AdvisoryClient::new()),
    );

    let mut failed = 0;
    for request in requests {
        let summary = pipeline.run(request).await;
        print_summary(&summary);
        if !summary.is_success() {
            failed += 1;
        }
    }

    if failed > 0 {
        error!("{} run(s) failed", failed);
        std::process::exit(1);
    }

    Ok(())
}

/// Resolves the build requests of this invocation
///
/// Rejections are reported by the extractor before they are returned.
async fn collect_requests(
    config: &Config,
    github: &GitHubClient,
    reporter: Arc<dyn Reporter>,
    source: DispatchSource,
) -> Result<Vec<BuildRequest>> {
    let extractor = ChangeExtractor::new(
        DispatchConfig {
            ci_config_dir: config.ci_config_dir.clone(),
        },
        reporter,
    );

    match source {
        DispatchSource::File { path, commit } => Ok(vec![file_request(&path, &commit)?]),
        DispatchSource::Commit(sha) => {
            let batch = commit_batch(&config.workdir, &sha)?;
            Ok(extractor.extract_push(&batch).await)
        }
        DispatchSource::PullRequest { number, commit } => {
            let files = github
                .list_pull_request_files(number)
                .await
                .with_context(|| format!("Failed to list files of pull request #{}", number))?;
            let head_sha = match github.get_pull_request(number).await {
                Ok(pull) => pull.head.sha,
                Err(e) => {
                    warn!("Failed to read pull request #{}, using {}: {}", number, commit, e);
                    commit
                }
            };

            let request = extractor
                .extract_pull_request(&PullRequestFiles {
                    number,
                    head_sha,
                    files,
                })
                .await?;
            Ok(vec![request])
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let tag = summary.tag.as_deref().unwrap_or("-");
    if summary.is_success() {
        println!(
            "{} {} {} ({} stages)",
            "✓".green().bold(),
            summary.request,
            tag.cyan(),
            summary.stages.len()
        );
    } else {
        let reason = summary
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        println!(
            "{} {} {} {}",
            "✗".red().bold(),
            summary.request,
            tag.cyan(),
            reason.red()
        );
        for entry in summary
            .logs
            .iter()
            .filter(|e| matches!(e.level, LogLevel::Warning | LogLevel::Error))
        {
            println!("    {}", entry.to_string().dimmed());
        }
    }
}
