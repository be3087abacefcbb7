//! Change event batch domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Batch of source-control change events processed in one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeBatch {
    Push(PushBatch),
    PullRequest(PullRequestFiles),
}

/// Ordered commits of a push
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushBatch {
    pub commits: Vec<Commit>,
}

impl PushBatch {
    /// Last commit of the batch, if any
    pub fn head(&self) -> Option<&Commit> {
        self.commits.last()
    }
}

/// A single pushed commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

impl Commit {
    /// Added then modified paths
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
    }
}

/// Files changed by a pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestFiles {
    pub number: u64,
    pub head_sha: String,
    pub files: Vec<String>,
}
