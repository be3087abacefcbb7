//! Reporting domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commit status state on the source-hosting system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Success,
    Pending,
    Failure,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Success => "success",
            StatusState::Pending => "pending",
            StatusState::Failure => "failure",
        }
    }
}

impl From<bool> for StatusState {
    fn from(passed: bool) -> Self {
        if passed {
            StatusState::Success
        } else {
            StatusState::Failure
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a comment is posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentTarget {
    PullRequest(u64),
    Commit(String),
}

impl fmt::Display for CommentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentTarget::PullRequest(number) => write!(f, "pull request #{}", number),
            CommentTarget::Commit(sha) => write!(f, "commit {}", sha),
        }
    }
}
