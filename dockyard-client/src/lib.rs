//! Dockyard HTTP Clients
//!
//! Type-safe HTTP clients for the remote services the CI talks to:
//! - `GitHubClient`: commit statuses, comments, pull request files and the
//!   pull request management used by the metadata bot
//! - `AdvisoryClient`: license list, metadata registry and package index lookups
//! - `TriggerClient`: remote build triggers used by the webhook dispatcher
//!
//! `GitHubReporter` adapts `GitHubClient` to the core `Reporter` trait.
//!
//! # Example
//!
//! ```no_run
//! use dockyard_client::GitHubClient;
//!
//! # async fn example() -> dockyard_client::Result<()> {
//! let client = GitHubClient::new("https://api.github.com", "BioContainers/containers", None);
//! let files = client.list_pull_request_files(42).await?;
//! println!("{} files changed", files.len());
//! # Ok(())
//! # }
//! ```

mod advisories;
mod comments;
pub mod error;
mod pulls;
mod reporter;
mod statuses;
mod trigger;

// Re-export commonly used types
pub use advisories::AdvisoryClient;
pub use error::{ClientError, Result};
pub use reporter::GitHubReporter;
pub use trigger::{BuildTrigger, TriggerClient};

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// Default API root of the source-hosting system
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = "dockyard-ci";

/// HTTP client for one repository on the source-hosting API
///
/// Requests are authenticated when a token is set. Endpoints are grouped by
/// concern:
/// - Commit statuses
/// - Pull request and commit comments
/// - Pull request files, creation, lookup and labels
#[derive(Debug, Clone)]
pub struct GitHubClient {
    /// API root (e.g., "https://api.github.com")
    api_url: String,
    /// Repository slug (e.g., "BioContainers/containers")
    repository: String,
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl GitHubClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `api_url` - API root, trailing slashes are ignored
    /// * `repository` - `owner/name` slug
    /// * `token` - Access token; `None` sends anonymous requests
    pub fn new(api_url: impl Into<String>, repository: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(api_url, repository, token, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: Option<String>,
        client: Client,
    ) -> Self {
        let api_url = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.filter(|t| !t.is_empty()),
            client,
        }
    }

    /// Get the API root
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Get the repository slug
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// True when requests are authenticated
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// URL of a repository-scoped endpoint
    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.repository, path)
    }

    /// Request builder with the API headers set
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header(reqwest::header::USER_AGENT, USER_AGENT);

        match &self.token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("token {}", token)),
            None => builder,
        }
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
///
/// This checks the status code and returns an appropriate error if the
/// request failed, or deserializes the response body if successful.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response whose body is ignored
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}
