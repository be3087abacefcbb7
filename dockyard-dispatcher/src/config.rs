//! Dispatcher configuration

use dockyard_client::DEFAULT_API_URL;

/// Webhook dispatcher settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    /// Job root of the remote build server
    pub trigger_url: String,
    pub push_job: String,
    pub pr_job: String,

    /// Token used for comments; without it comments are only logged
    pub github_token: Option<String>,
    pub github_repository: String,
    pub github_api_url: String,

    /// Top-level CI configuration directory
    pub ci_config_dir: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Environment variables:
    /// - DISPATCHER_BIND_ADDR (default: 0.0.0.0:8080)
    /// - TRIGGER_URL, TRIGGER_PUSH_JOB, TRIGGER_PR_JOB
    /// - GITHUB_STATUS_TOKEN, GITHUB_REPOSITORY, GITHUB_API_URL
    /// - CI_CONFIG_DIR
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any variable source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            bind_addr: var("DISPATCHER_BIND_ADDR").unwrap_or(defaults.bind_addr),
            trigger_url: var("TRIGGER_URL").unwrap_or(defaults.trigger_url),
            push_job: var("TRIGGER_PUSH_JOB").unwrap_or(defaults.push_job),
            pr_job: var("TRIGGER_PR_JOB").unwrap_or(defaults.pr_job),
            github_token: var("GITHUB_STATUS_TOKEN"),
            github_repository: var("GITHUB_REPOSITORY").unwrap_or(defaults.github_repository),
            github_api_url: var("GITHUB_API_URL").unwrap_or(defaults.github_api_url),
            ci_config_dir: var("CI_CONFIG_DIR").unwrap_or(defaults.ci_config_dir),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [("trigger_url", &self.trigger_url), ("github_api_url", &self.github_api_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.push_job.is_empty() || self.pr_job.is_empty() {
            anyhow::bail!("trigger job names cannot be empty");
        }

        if self.github_repository.split('/').count() != 2 {
            anyhow::bail!("github_repository must be an owner/name slug");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            trigger_url: "http://cluster.local:30752/jenkins/job".to_string(),
            push_job: "container-testci".to_string(),
            pr_job: "container-testci-pr".to_string(),
            github_token: None,
            github_repository: "BioContainers/containers".to_string(),
            github_api_url: DEFAULT_API_URL.to_string(),
            ci_config_dir: ".github".to_string(),
        }
    }
}
