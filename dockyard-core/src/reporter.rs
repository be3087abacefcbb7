//! Reporter collaborator
//!
//! Posts commit statuses and comments to the source-hosting system.
//! Implementations must silently do nothing when the integration is not
//! configured, and must never fail the caller.

use async_trait::async_trait;

pub use crate::domain::status::{CommentTarget, StatusState};

/// Status and comment sink on the source-hosting system
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Sets the status of `commit` for the check named after `subject`
    ///
    /// # Arguments
    /// * `commit` - Commit SHA the status is attached to
    /// * `subject` - Software name the check is about
    /// * `state` - Passed, pending or failed
    /// * `details` - Human-readable messages, joined into the description
    async fn report_status(&self, commit: &str, subject: &str, state: StatusState, details: &[String]);

    /// Posts a comment on a pull request or commit
    async fn report_comment(&self, target: &CommentTarget, body: &str);
}

/// Description sent with a status, built from its detail messages
pub fn status_description(details: &[String]) -> String {
    if details.is_empty() {
        "Checking recipe metadata".to_string()
    } else {
        details.join(", ")
    }
}
