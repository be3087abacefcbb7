//! Metadata registry bot
//!
//! Records published container versions in the metadata repository through a
//! bot pull request. An open bot pull request is reused; otherwise a fresh
//! branch is pushed and a labelled pull request is opened.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use dockyard_client::GitHubClient;
use dockyard_core::domain::labels::{LabelSet, keys};
use dockyard_core::dto::github::CreatePullRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use super::{MetadataRegistry, run_tool};
use crate::config::{MetadataConfig, MetadataFormat, MetadataLayout};

/// Label identifying bot pull requests
pub const BOT_LABEL: &str = "biocontainers-bot-import";
/// Title of bot pull requests
pub const PR_TITLE: &str = "biocontainers-bot metadata import PR";
/// Base branch of the metadata repository
pub const BASE_BRANCH: &str = "master";

const VERSION_TYPE: &str = "Container file";

/// One metadata file of the repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    #[serde(default)]
    pub softwares: BTreeMap<String, SoftwareEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareEntry {
    pub software: String,
    #[serde(default)]
    pub labels: LabelSet,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

/// A published container version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub url: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub labels: LabelSet,
}

impl MetadataFile {
    /// Adds version `tag` of `name` unless already listed
    ///
    /// # Returns
    /// True if the file changed
    pub fn add_version(&mut self, name: &str, url: &str, tag: &str, labels: &LabelSet) -> bool {
        let entry = self
            .softwares
            .entry(name.to_string())
            .or_insert_with(|| SoftwareEntry {
                software: name.to_string(),
                labels: labels.clone(),
                versions: Vec::new(),
            });

        if entry.versions.iter().any(|v| v.version == tag) {
            return false;
        }

        entry.labels = labels.clone();
        entry.versions.push(VersionEntry {
            url: url.to_string(),
            version: tag.to_string(),
            kind: VERSION_TYPE.to_string(),
            labels: labels.clone(),
        });
        true
    }

    pub fn parse(content: &str, format: MetadataFormat) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        match format {
            MetadataFormat::Yaml => serde_yml::from_str(content).context("Invalid metadata YAML"),
            MetadataFormat::Json => serde_json::from_str(content).context("Invalid metadata JSON"),
        }
    }

    pub fn render(&self, format: MetadataFormat) -> Result<String> {
        match format {
            MetadataFormat::Yaml => serde_yml::to_string(self).context("Failed to render YAML"),
            MetadataFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to render JSON")
            }
        }
    }
}

/// Repository-relative metadata files for `name`
///
/// The import file is always written; the per-tool layout adds a copy under
/// the registry entry directory when the entry is known. An entry that is not
/// a single plain path component is skipped.
pub fn metadata_paths(
    layout: MetadataLayout,
    format: MetadataFormat,
    name: &str,
    registry_entry: Option<&str>,
) -> Vec<PathBuf> {
    let file = format!("{}.biocontainers.{}", name, format.extension());
    let mut paths = vec![Path::new("import").join("biocontainers").join(&file)];

    if let (MetadataLayout::PerTool, Some(entry)) = (layout, registry_entry) {
        if is_plain_component(entry) {
            paths.push(Path::new("data").join(entry).join(&file));
        } else {
            warn!("Ignoring registry entry {:?} for {}, not a plain directory name", entry, name);
        }
    }
    paths
}

fn is_plain_component(entry: &str) -> bool {
    let mut components = Path::new(entry).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Adds the version to every metadata file under `root`
///
/// # Returns
/// The repository-relative paths that changed
pub async fn write_metadata(
    root: &Path,
    paths: &[PathBuf],
    format: MetadataFormat,
    name: &str,
    url: &str,
    tag: &str,
    labels: &LabelSet,
) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();

    for relative in paths {
        let path = root.join(relative);
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        let mut file = MetadataFile::parse(&existing, format)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if !file.add_version(name, url, tag, labels) {
            continue;
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, file.render(format)?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        changed.push(relative.clone());
    }

    Ok(changed)
}

/// `MetadataRegistry` opening pull requests on the metadata repository
pub struct MetadataBot {
    config: MetadataConfig,
    /// Public image namespace used in version URLs
    namespace: String,
    github: GitHubClient,
}

impl MetadataBot {
    pub fn new(config: MetadataConfig, namespace: impl Into<String>, api_url: &str) -> Self {
        let github = GitHubClient::new(
            api_url,
            config.repository.clone(),
            Some(config.token.clone()),
        );
        Self {
            config,
            namespace: namespace.into(),
            github,
        }
    }

    /// True when the deploy key is present
    pub fn has_ssh_key(&self) -> bool {
        self.config.ssh_key.is_file()
    }

    fn remote(&self) -> String {
        format!("git@github.com:{}.git", self.config.repository)
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new("git");
        command
            .args(args)
            .env(
                "GIT_SSH_COMMAND",
                format!(
                    "ssh -i {} -o StrictHostKeyChecking=no",
                    self.config.ssh_key.display()
                ),
            );

        if self.config.checkout_dir.exists() && args.first() != Some(&"clone") {
            command.current_dir(&self.config.checkout_dir);
        }

        run_tool(&mut command, &format!("git {}", args.first().unwrap_or(&""))).await
    }

    /// Clones or refreshes the checkout and switches to `branch`
    async fn setup_checkout(&self, branch: &str, existing_pr: bool) -> Result<()> {
        if !self.config.checkout_dir.exists() {
            let dir = self.config.checkout_dir.to_string_lossy().to_string();
            let remote = self.remote();
            info!("Cloning {} into {}", remote, dir);
            self.git(&["clone", "--branch", BASE_BRANCH, &remote, &dir])
                .await?;
        }

        if existing_pr {
            self.git(&["fetch", "origin", branch]).await?;
            let upstream = format!("origin/{}", branch);
            self.git(&["checkout", "-B", branch, &upstream]).await?;
        } else {
            self.git(&["fetch", "origin", BASE_BRANCH]).await?;
            let upstream = format!("origin/{}", BASE_BRANCH);
            self.git(&["checkout", "-B", branch, &upstream]).await?;
        }

        info!("Metadata checkout on branch {}", branch);
        Ok(())
    }

    async fn publish(&self, container: &str, tag: &str, labels: &LabelSet) -> Result<()> {
        let registry_entry = labels
            .non_empty(keys::BIOTOOLS)
            .map(|id| id.rsplit('/').next().unwrap_or(id).to_string());
        if registry_entry.is_none() {
            warn!("No registry entry label for {}", container);
        }

        let open_pr = self
            .github
            .find_open_pull_request(BOT_LABEL)
            .await
            .context("Failed to look up open bot pull request")?;
        let (branch, existing_pr) = match &open_pr {
            Some(pr) => (pr.head.branch.clone(), true),
            None => (format!("{}-{}", BOT_LABEL, Utc::now().timestamp()), false),
        };

        self.setup_checkout(&branch, existing_pr).await?;

        let paths = metadata_paths(
            self.config.layout,
            self.config.format,
            container,
            registry_entry.as_deref(),
        );
        let url = format!("{}/{}:{}", self.namespace, container, tag);
        let changed = write_metadata(
            &self.config.checkout_dir,
            &paths,
            self.config.format,
            container,
            &url,
            tag,
            labels,
        )
        .await?;

        if changed.is_empty() {
            info!("Version {}:{} already recorded", container, tag);
            return Ok(());
        }

        let mut add = vec!["add".to_string()];
        add.extend(changed.iter().map(|p| p.to_string_lossy().to_string()));
        let add: Vec<&str> = add.iter().map(String::as_str).collect();
        self.git(&add).await?;

        let message = format!("Add version for {}:{}", container, tag);
        self.git(&[
            "-c",
            "user.name=biocontainers-bot",
            "-c",
            "user.email=biocontainers-bot@users.noreply.github.com",
            "commit",
            "-m",
            &message,
        ])
        .await?;

        if existing_pr {
            self.git(&["push", "origin", &branch]).await?;
            info!("Updated bot pull request on {}", branch);
            return Ok(());
        }

        self.git(&["push", "-u", "origin", &branch]).await?;
        let pr = self
            .github
            .create_pull_request(&CreatePullRequest {
                title: PR_TITLE.to_string(),
                head: branch.clone(),
                base: BASE_BRANCH.to_string(),
                body: String::new(),
            })
            .await
            .context("Failed to open bot pull request")?;
        info!("Opened bot pull request #{}", pr.number);

        if let Err(e) = self.github.add_labels(pr.number, &[BOT_LABEL]).await {
            warn!("Failed to label pull request #{}: {}", pr.number, e);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataRegistry for MetadataBot {
    async fn record_version(&self, container: &str, tag: &str, labels: &LabelSet) -> Result<()> {
        match self.publish(container, tag, labels).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_dir_all(&self.config.checkout_dir).await {
                    warn!(
                        "Failed to remove metadata checkout {}: {}",
                        self.config.checkout_dir.display(),
                        rm
                    );
                }
                Err(e)
            }
        }
    }
}
