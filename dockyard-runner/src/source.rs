//! Dispatch sources of the CLI
//!
//! Resolves what a CLI invocation should build:
//! - An explicit Dockerfile path
//! - A pull request, selected by a `refs/pull/<n>/merge` ref
//! - A single commit, read from the local clone with git

use anyhow::{Context, Result};
use chrono::Utc;
use dockyard_core::domain::change::{Commit, PushBatch};
use dockyard_core::domain::request::{BuildRequest, ContainerDir};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// What one CLI invocation dispatches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchSource {
    /// Explicit `<container>/<version>/Dockerfile`, built at `commit`
    File { path: PathBuf, commit: String },
    /// Pull request number and the commit under test
    PullRequest { number: u64, commit: String },
    /// Files added or modified by one commit
    Commit(String),
}

impl DispatchSource {
    /// Picks the source from CLI options; a file wins over refs and commits
    pub fn resolve(
        file: Option<PathBuf>,
        commit: Option<String>,
        git_ref: Option<&str>,
    ) -> Result<Self> {
        let commit = commit.filter(|c| !c.trim().is_empty());
        if let Some(path) = file {
            return Ok(Self::File {
                path,
                commit: commit.unwrap_or_default(),
            });
        }

        if let Some(number) = git_ref.and_then(pull_request_number) {
            info!("Pull request #{}", number);
            return Ok(Self::PullRequest {
                number,
                commit: commit.unwrap_or_default(),
            });
        }

        match commit {
            Some(commit) => {
                info!("Commit {}", commit);
                Ok(Self::Commit(commit))
            }
            None => anyhow::bail!("Nothing to build: pass --file, --commit or a pull request --ref"),
        }
    }
}

/// Pull request number of a `refs/pull/<n>/merge` ref
pub fn pull_request_number(git_ref: &str) -> Option<u64> {
    git_ref
        .strip_prefix("refs/pull/")?
        .strip_suffix("/merge")?
        .parse()
        .ok()
}

/// Build request for an explicit Dockerfile path
///
/// Container and version are the two directories above the file.
pub fn file_request(file: &Path, trigger_ref: &str) -> Result<BuildRequest> {
    if !file.exists() {
        anyhow::bail!("file not found: {}", file.display());
    }

    let mut parents = file
        .parent()
        .into_iter()
        .flat_map(|p| p.iter().rev())
        .filter_map(|s| s.to_str());
    let version = parents.next();
    let container = parents.next();

    match (container, version) {
        (Some(container), Some(version)) => {
            let dir = ContainerDir {
                container: container.to_string(),
                version: version.to_string(),
            };
            if !dir.has_valid_name() {
                anyhow::bail!("{} is not a valid container name", dir.container);
            }
            Ok(BuildRequest::new(dir, trigger_ref))
        }
        _ => anyhow::bail!(
            "Invalid structure, Dockerfile must be in directory softwarename/softwareversion/Dockerfile: {}",
            file.display()
        ),
    }
}

/// Splits `git diff-tree --name-status` output into added and modified paths
///
/// Deletions are dropped; a rename or copy counts as adding its new path.
pub fn parse_name_status(output: &str) -> (Vec<String>, Vec<String>) {
    let mut added = Vec::new();
    let mut modified = Vec::new();

    for line in output.lines() {
        let mut fields = line.split('\t');
        let Some(status) = fields.next().and_then(|s| s.chars().next()) else {
            continue;
        };
        let Some(path) = fields.last().filter(|p| !p.is_empty()) else {
            continue;
        };

        match status {
            'A' | 'R' | 'C' => added.push(path.to_string()),
            'M' | 'T' => modified.push(path.to_string()),
            _ => debug!("Ignoring {} {}", status, path),
        }
    }

    (added, modified)
}

/// One-commit push batch with the files `sha` touched in `workdir`
pub fn commit_batch(workdir: &Path, sha: &str) -> Result<PushBatch> {
    let output = Command::new("git")
        .args(["diff-tree", "--no-commit-id", "--name-status", "-r", sha])
        .current_dir(workdir)
        .output()
        .context("Failed to execute git diff-tree. Is git installed?")?;

    if !output.status.success() {
        anyhow::bail!(
            "git diff-tree {} failed: {}",
            sha,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let (added, modified) = parse_name_status(&String::from_utf8_lossy(&output.stdout));
    for path in added.iter().chain(modified.iter()) {
        info!("Commit {} touched {}", sha, path);
    }

    Ok(PushBatch {
        commits: vec![Commit {
            id: sha.to_string(),
            timestamp: Utc::now(),
            added,
            modified,
        }],
    })
}
