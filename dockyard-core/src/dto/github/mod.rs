//! Source-hosting REST API bodies

use serde::{Deserialize, Serialize};

use crate::domain::status::StatusState;

/// Prefix of the status context, followed by the software name
pub const STATUS_CONTEXT_PREFIX: &str = "biocontainers/status/check/";

/// Status context for checks about `software`
pub fn status_context(software: &str) -> String {
    format!("{}{}", STATUS_CONTEXT_PREFIX, software)
}

/// Body of a commit status update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStatus {
    pub state: StatusState,
    pub description: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

/// Body of an issue, pull request or commit comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComment {
    pub body: String,
}

/// A file changed by a pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    #[serde(default)]
    pub status: String,
}

/// Body used to open a pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

/// Pull request as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
    #[serde(rename = "ref")]
    pub branch: String,
}

/// Body used to add labels to an issue or pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddLabels {
    pub labels: Vec<String>,
}

/// Issue search result page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSearch {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<IssueItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueItem {
    pub number: u64,
    #[serde(default)]
    pub state: String,
}
