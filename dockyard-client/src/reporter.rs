//! Reporter backed by the source-hosting API

use async_trait::async_trait;
use dockyard_core::dto::github::{CreateStatus, status_context};
use dockyard_core::reporter::{CommentTarget, Reporter, StatusState, status_description};
use tracing::{debug, info, warn};

use crate::GitHubClient;

/// Posts statuses and comments through a `GitHubClient`
///
/// Without an authenticated client every report is only logged. API errors
/// are logged and never reach the caller.
#[derive(Debug, Clone)]
pub struct GitHubReporter {
    client: Option<GitHubClient>,
}

impl GitHubReporter {
    /// Reporter posting through `client` when it carries a token
    pub fn new(client: GitHubClient) -> Self {
        Self {
            client: client.has_token().then_some(client),
        }
    }

    /// Reporter that only logs
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl Reporter for GitHubReporter {
    async fn report_status(&self, commit: &str, subject: &str, state: StatusState, details: &[String]) {
        if commit.is_empty() {
            debug!("Status {} for {} not sent: no commit", state, subject);
            return;
        }

        let status = CreateStatus {
            state,
            description: status_description(details),
            context: status_context(subject),
            target_url: None,
        };

        let Some(client) = &self.client else {
            debug!(
                "Status {} for {} on {} not sent: {}",
                state, subject, commit, status.description
            );
            return;
        };

        match client.create_status(commit, &status).await {
            Ok(()) => info!("Sent status {} for {} on {}", state, subject, commit),
            Err(e) => warn!("Failed to send status for {} on {}: {}", subject, commit, e),
        }
    }

    async fn report_comment(&self, target: &CommentTarget, body: &str) {
        let Some(client) = &self.client else {
            debug!("Comment on {} not sent: {}", target, body);
            return;
        };

        match client.comment(target, body).await {
            Ok(()) => info!("Sent comment on {}", target),
            Err(e) => warn!("Failed to comment on {}: {}", target, e),
        }
    }
}
