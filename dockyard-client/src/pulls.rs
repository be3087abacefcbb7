//! Pull request endpoints

use crate::error::Result;
use crate::{GitHubClient, handle_empty_response, handle_response};
use dockyard_core::dto::github::{
    AddLabels, CreatePullRequest, IssueSearch, PullRequest, PullRequestFile,
};
use reqwest::Method;
use tracing::debug;

/// Page size used when listing pull request files
pub const FILES_PER_PAGE: usize = 100;

impl GitHubClient {
    // =============================================================================
    // Pull Request Files
    // =============================================================================

    /// List every file changed by a pull request
    ///
    /// Pages are fetched until a short page is returned.
    pub async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>> {
        let url = self.repo_url(&format!("pulls/{}/files", number));
        let mut files = Vec::new();
        let mut page = 1usize;

        loop {
            let response = self
                .request(Method::GET, &url)
                .query(&[("per_page", FILES_PER_PAGE), ("page", page)])
                .send()
                .await?;
            let batch: Vec<PullRequestFile> = handle_response(response).await?;
            let count = batch.len();
            files.extend(batch.into_iter().map(|f| f.filename));

            debug!("Pull request #{} page {}: {} file(s)", number, page, count);
            if count < FILES_PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(files)
    }

    // =============================================================================
    // Pull Request Management
    // =============================================================================

    /// Get a pull request by number
    pub async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let url = self.repo_url(&format!("pulls/{}", number));
        let response = self.request(Method::GET, &url).send().await?;

        handle_response(response).await
    }

    /// Open a pull request
    pub async fn create_pull_request(&self, req: &CreatePullRequest) -> Result<PullRequest> {
        let url = self.repo_url("pulls");
        let response = self.request(Method::POST, &url).json(req).send().await?;

        handle_response(response).await
    }

    /// Add labels to a pull request
    pub async fn add_labels(&self, number: u64, labels: &[&str]) -> Result<()> {
        let url = self.repo_url(&format!("issues/{}/labels", number));
        let body = AddLabels {
            labels: labels.iter().map(|l| l.to_string()).collect(),
        };
        let response = self.request(Method::POST, &url).json(&body).send().await?;

        handle_empty_response(response).await
    }

    /// Find an open pull request of this repository carrying `label`
    ///
    /// # Returns
    /// The first match, or `None`
    pub async fn find_open_pull_request(&self, label: &str) -> Result<Option<PullRequest>> {
        let url = format!("{}/search/issues", self.api_url);
        let query = format!("is:pr state:open label:{} repo:{}", label, self.repository);
        let response = self
            .request(Method::GET, &url)
            .query(&[("q", query)])
            .send()
            .await?;
        let search: IssueSearch = handle_response(response).await?;

        match search.items.first() {
            Some(item) => self.get_pull_request(item.number).await.map(Some),
            None => Ok(None),
        }
    }
}
