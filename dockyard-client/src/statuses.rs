//! Commit status endpoints

use crate::error::Result;
use crate::{GitHubClient, handle_empty_response};
use dockyard_core::dto::github::CreateStatus;
use reqwest::Method;

impl GitHubClient {
    /// Set a status on a commit
    ///
    /// # Arguments
    /// * `sha` - Commit the status is attached to
    /// * `status` - State, description and context
    pub async fn create_status(&self, sha: &str, status: &CreateStatus) -> Result<()> {
        let url = self.repo_url(&format!("statuses/{}", sha));
        let response = self.request(Method::POST, &url).json(status).send().await?;

        handle_empty_response(response).await
    }
}
