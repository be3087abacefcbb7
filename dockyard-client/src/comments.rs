//! Comment endpoints

use crate::error::Result;
use crate::{GitHubClient, handle_empty_response};
use dockyard_core::domain::status::CommentTarget;
use dockyard_core::dto::github::CreateComment;
use reqwest::Method;

impl GitHubClient {
    /// Comment on a pull request (through its issue)
    pub async fn create_issue_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = self.repo_url(&format!("issues/{}/comments", number));
        self.post_comment(&url, body).await
    }

    /// Comment on a commit
    pub async fn create_commit_comment(&self, sha: &str, body: &str) -> Result<()> {
        let url = self.repo_url(&format!("commits/{}/comments", sha));
        self.post_comment(&url, body).await
    }

    /// Comment on a pull request or commit
    pub async fn comment(&self, target: &CommentTarget, body: &str) -> Result<()> {
        match target {
            CommentTarget::PullRequest(number) => self.create_issue_comment(*number, body).await,
            CommentTarget::Commit(sha) => self.create_commit_comment(sha, body).await,
        }
    }

    async fn post_comment(&self, url: &str, body: &str) -> Result<()> {
        let comment = CreateComment {
            body: body.to_string(),
        };
        let response = self.request(Method::POST, url).json(&comment).send().await?;

        handle_empty_response(response).await
    }
}
