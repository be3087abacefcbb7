//! Change extraction
//!
//! Turns a batch of change events into the minimal set of build requests:
//! - Push batches: one request per touched `container/version` directory, the
//!   latest commit touching it wins
//! - Pull requests: exactly one container directory, never CI files
//!
//! Every rejection is reported before it is returned.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::change::{ChangeBatch, PullRequestFiles, PushBatch};
use crate::domain::request::{BuildRequest, ContainerDir};
use crate::error::DispatchError;
use crate::reporter::{CommentTarget, Reporter};

/// Message posted when a push touches no container
pub const NO_CHANGE_MESSAGE: &str = "no file modified, skipping request";

/// Dispatch settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Top-level CI configuration directory, never modifiable from a recipe PR
    pub ci_config_dir: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ci_config_dir: ".github".to_string(),
        }
    }
}

/// Converts change batches into build requests
pub struct ChangeExtractor {
    config: DispatchConfig,
    reporter: Arc<dyn Reporter>,
}

impl ChangeExtractor {
    pub fn new(config: DispatchConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self { config, reporter }
    }

    /// Extracts the build requests of any batch
    pub async fn extract(&self, batch: &ChangeBatch) -> Result<Vec<BuildRequest>, DispatchError> {
        match batch {
            ChangeBatch::Push(push) => Ok(self.extract_push(push).await),
            ChangeBatch::PullRequest(files) => {
                self.extract_pull_request(files).await.map(|r| vec![r])
            }
        }
    }

    /// Extracts build requests from a push batch
    ///
    /// An empty result is reported and is not an error.
    pub async fn extract_push(&self, batch: &PushBatch) -> Vec<BuildRequest> {
        let requests = plan_push(batch);

        if requests.is_empty() {
            warn!("No container modified in push batch, nothing to dispatch");
            if let Some(head) = batch.head() {
                self.reporter
                    .report_comment(&CommentTarget::Commit(head.id.clone()), NO_CHANGE_MESSAGE)
                    .await;
            }
            return requests;
        }

        info!(
            "Push batch of {} commit(s) yields {} build request(s)",
            batch.commits.len(),
            requests.len()
        );
        requests
    }

    /// Extracts the single build request of a pull request
    pub async fn extract_pull_request(
        &self,
        files: &PullRequestFiles,
    ) -> Result<BuildRequest, DispatchError> {
        match plan_pull_request(&self.config, files) {
            Ok(request) => {
                info!("Pull request #{} dispatches {}", files.number, request);
                Ok(request)
            }
            Err(e) => {
                warn!("Pull request #{} rejected: {}", files.number, e.reason());
                self.reporter
                    .report_comment(&CommentTarget::PullRequest(files.number), e.reason())
                    .await;
                Err(e)
            }
        }
    }
}

/// Computes the build requests of a push batch without reporting anything
pub fn plan_push(batch: &PushBatch) -> Vec<BuildRequest> {
    // dir -> index of the winning commit; `order` keeps first-seen order
    let mut winners: HashMap<ContainerDir, usize> = HashMap::new();
    let mut order: Vec<ContainerDir> = Vec::new();

    for (idx, commit) in batch.commits.iter().enumerate() {
        let mut dirs: Vec<ContainerDir> = Vec::new();
        for path in commit.touched_paths() {
            match ContainerDir::from_path(path) {
                Some(dir) if dir.has_valid_name() => {
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                }
                Some(dir) => debug!("Ignoring {}: {} is not a container", path, dir.container),
                None => debug!("Ignoring {}: not in a container directory", path),
            }
        }

        for dir in dirs {
            match winners.get(&dir).copied() {
                Some(current) if batch.commits[current].timestamp > commit.timestamp => {
                    debug!(
                        "Commit {} superseded by {} for {}",
                        commit.id, batch.commits[current].id, dir
                    );
                }
                Some(_) => {
                    winners.insert(dir, idx);
                }
                None => {
                    winners.insert(dir.clone(), idx);
                    order.push(dir);
                }
            }
        }
    }

    order
        .into_iter()
        .map(|dir| {
            let commit = &batch.commits[winners[&dir]];
            BuildRequest::new(dir, commit.id.clone())
        })
        .collect()
}

/// Computes the build request of a pull request without reporting anything
pub fn plan_pull_request(
    config: &DispatchConfig,
    files: &PullRequestFiles,
) -> Result<BuildRequest, DispatchError> {
    if let Some(path) = files
        .files
        .iter()
        .find(|path| first_segment(path) == config.ci_config_dir)
    {
        return Err(DispatchError::rejected(format!(
            "Cannot modify CI configuration files ({})",
            path
        )));
    }

    let mut dirs: Vec<ContainerDir> = Vec::new();
    for path in &files.files {
        let dir = ContainerDir::from_path(path).ok_or_else(|| {
            DispatchError::rejected(format!(
                "You're trying to update a file not related to a container: {}, this is forbidden",
                path
            ))
        })?;
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    let dir = match dirs.len() {
        0 => return Err(DispatchError::rejected("could not find any container")),
        1 => dirs.remove(0),
        _ => {
            return Err(DispatchError::rejected(
                "can't modify multiple containers in a same pull request",
            ));
        }
    };

    if !dir.has_valid_name() {
        return Err(DispatchError::rejected(
            "Invalid structure, Dockerfile must be in directory softwarename/softwareversion/Dockerfile",
        ));
    }

    Ok(BuildRequest::for_pull_request(
        dir,
        files.head_sha.clone(),
        files.number,
    ))
}

fn first_segment(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.split('/').next().unwrap_or_default()
}
