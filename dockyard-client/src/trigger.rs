//! Remote build triggers

use async_trait::async_trait;
use dockyard_core::domain::request::BuildRequest;
use reqwest::Client;
use tracing::info;

use crate::error::Result;
use crate::handle_empty_response;

/// Starts a remote pipeline run for a build request
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    async fn trigger(&self, request: &BuildRequest) -> Result<()>;
}

/// Triggers parameterized jobs on a remote build server
///
/// Push requests and pull request requests go to different jobs.
#[derive(Debug, Clone)]
pub struct TriggerClient {
    /// Job root (e.g., "http://jenkins:8080/job")
    base_url: String,
    push_job: String,
    pr_job: String,
    client: Client,
}

impl TriggerClient {
    pub fn new(
        base_url: impl Into<String>,
        push_job: impl Into<String>,
        pr_job: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            push_job: push_job.into(),
            pr_job: pr_job.into(),
            client: Client::new(),
        }
    }

    /// Job that builds `request`
    pub fn job_for(&self, request: &BuildRequest) -> &str {
        if request.is_pull_request() {
            &self.pr_job
        } else {
            &self.push_job
        }
    }

    /// Job parameters describing `request`
    pub fn parameters(request: &BuildRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("FORCE_CONTAINER", request.container().to_string()),
            ("FORCE_TOOL_VERSION", request.version().to_string()),
            ("FORCE_SHA1", request.trigger_ref().to_string()),
        ];
        if let Some(number) = request.pull_request() {
            params.push(("PULL_REQUEST_ID", number.to_string()));
        }
        params
    }
}

#[async_trait]
impl BuildTrigger for TriggerClient {
    async fn trigger(&self, request: &BuildRequest) -> Result<()> {
        let url = format!("{}/{}/buildWithParameters", self.base_url, self.job_for(request));
        let response = self
            .client
            .post(&url)
            .query(&Self::parameters(request))
            .send()
            .await?;

        handle_empty_response(response).await?;
        info!("Triggered {} for {}", self.job_for(request), request);
        Ok(())
    }
}
