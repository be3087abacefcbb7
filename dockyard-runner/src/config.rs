//! Runner configuration
//!
//! Defines every configurable parameter of a pipeline run: recipe location,
//! registries, external integrations and guards. The configuration is built
//! once per process and shared read-only by the pipeline and its adapters.

use std::path::PathBuf;
use std::str::FromStr;

use dockyard_core::domain::request::is_valid_container_name;

/// Registry credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

/// Security scanner settings
#[derive(Debug, Clone)]
pub struct AnchoreConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Image running the scanner CLI
    pub image: String,
}

/// Object store settings for converted artifacts
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Serialization of metadata files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    Yaml,
    Json,
}

impl MetadataFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MetadataFormat::Yaml => "yaml",
            MetadataFormat::Json => "json",
        }
    }
}

impl FromStr for MetadataFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(MetadataFormat::Yaml),
            "json" => Ok(MetadataFormat::Json),
            other => anyhow::bail!("unknown metadata format '{}'", other),
        }
    }
}

/// Where metadata files are written in the metadata repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataLayout {
    /// One import file per software
    Single,
    /// Import file plus a copy under the registry entry directory
    PerTool,
}

impl FromStr for MetadataLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(MetadataLayout::Single),
            "per-tool" | "per_tool" => Ok(MetadataLayout::PerTool),
            other => anyhow::bail!("unknown metadata layout '{}'", other),
        }
    }
}

/// Metadata registry bot settings
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub token: String,
    /// Deploy key used to push to the metadata repository
    pub ssh_key: PathBuf,
    /// `owner/name` of the metadata repository
    pub repository: String,
    /// Local checkout of the metadata repository
    pub checkout_dir: PathBuf,
    pub format: MetadataFormat,
    pub layout: MetadataLayout,
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the recipe repository
    pub workdir: PathBuf,

    /// Suppress push, metadata registration and upload side effects
    pub dry_run: bool,

    /// Public image namespace (e.g., "biocontainers")
    pub namespace: String,

    /// Secondary registry host, images are also tagged and pushed there
    pub registry_url: Option<String>,

    /// Public registry credentials; push is skipped without them
    pub dockerhub: Option<RegistryAuth>,

    pub anchore: Option<AnchoreConfig>,
    pub metadata: Option<MetadataConfig>,
    pub object_store: Option<ObjectStoreConfig>,

    /// Cache and temporary directory of the converter
    pub singularity_tmp: Option<PathBuf>,

    /// Directory receiving converted artifacts
    pub convert_dir: PathBuf,

    /// Reporter settings
    pub github_token: Option<String>,
    pub github_repository: String,
    pub github_api_url: String,

    /// Dockerfile fragments that abort the build
    pub restricted_paths: Vec<String>,

    /// CI configuration directory, never modifiable from a pull request
    pub ci_config_dir: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - WORKDIR or GITHUB_WORKSPACE (default: current directory)
    /// - DRY_RUN (1/true/yes)
    /// - IMAGE_NAMESPACE (default: biocontainers)
    /// - REGISTRY_URL
    /// - DOCKERHUB_USERNAME, DOCKERHUB_PASSWORD
    /// - ANCHORE_URL, ANCHORE_USERNAME, ANCHORE_PASSWORD, ANCHORE_IMAGE
    /// - BIOTOOLS_TOKEN, BIOTOOLS_SSH_KEY, BIOTOOLS_REPO, BIOTOOLS_CHECKOUT,
    ///   METADATA_FORMAT (yaml|json), METADATA_LAYOUT (single|per-tool)
    /// - S3_BUCKET, S3_ENDPOINT, S3_REGION, S3_ACCESS_KEY, S3_SECRET_ACCESS_KEY
    /// - SINGULARITY_TMP, CONVERT_DIR (default: /tmp)
    /// - GITHUB_TOKEN, GITHUB_REPOSITORY, GITHUB_API_URL
    /// - RESTRICTED_PATHS (comma separated), CI_CONFIG_DIR
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any variable source
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let workdir = var("WORKDIR")
            .or_else(|| var("GITHUB_WORKSPACE"))
            .map(PathBuf::from)
            .unwrap_or(defaults.workdir);

        let dry_run = var("DRY_RUN")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let dockerhub = var("DOCKERHUB_USERNAME").map(|username| RegistryAuth {
            username,
            password: var("DOCKERHUB_PASSWORD").unwrap_or_default(),
        });

        let anchore = var("ANCHORE_URL").map(|url| AnchoreConfig {
            url,
            username: var("ANCHORE_USERNAME").unwrap_or_default(),
            password: var("ANCHORE_PASSWORD").unwrap_or_default(),
            image: var("ANCHORE_IMAGE").unwrap_or_else(|| "biocontainers/anchore-cli".to_string()),
        });

        let metadata = match var("BIOTOOLS_TOKEN") {
            Some(token) => Some(MetadataConfig {
                token,
                ssh_key: var("BIOTOOLS_SSH_KEY")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/root/.ssh/id_rsa")),
                repository: var("BIOTOOLS_REPO").unwrap_or_else(|| "bio-tools/content".to_string()),
                checkout_dir: var("BIOTOOLS_CHECKOUT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp/biotools-content")),
                format: var("METADATA_FORMAT")
                    .map(|v| v.parse::<MetadataFormat>())
                    .transpose()?
                    .unwrap_or(MetadataFormat::Yaml),
                layout: var("METADATA_LAYOUT")
                    .map(|v| v.parse::<MetadataLayout>())
                    .transpose()?
                    .unwrap_or(MetadataLayout::PerTool),
            }),
            None => None,
        };

        let object_store = var("S3_BUCKET").map(|bucket| ObjectStoreConfig {
            bucket,
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION"),
            access_key: var("S3_ACCESS_KEY"),
            secret_access_key: var("S3_SECRET_ACCESS_KEY"),
        });

        let restricted_paths = var("RESTRICTED_PATHS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.restricted_paths);

        Ok(Self {
            workdir,
            dry_run,
            namespace: var("IMAGE_NAMESPACE").unwrap_or(defaults.namespace),
            registry_url: var("REGISTRY_URL").map(|u| u.trim_end_matches('/').to_string()),
            dockerhub,
            anchore,
            metadata,
            object_store,
            singularity_tmp: var("SINGULARITY_TMP").map(PathBuf::from),
            convert_dir: var("CONVERT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.convert_dir),
            github_token: var("GITHUB_TOKEN"),
            github_repository: var("GITHUB_REPOSITORY").unwrap_or(defaults.github_repository),
            github_api_url: var("GITHUB_API_URL").unwrap_or(defaults.github_api_url),
            restricted_paths,
            ci_config_dir: var("CI_CONFIG_DIR").unwrap_or(defaults.ci_config_dir),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_valid_container_name(&self.namespace) {
            anyhow::bail!("namespace '{}' is not a valid image namespace", self.namespace);
        }

        if !self.github_api_url.starts_with("http://") && !self.github_api_url.starts_with("https://")
        {
            anyhow::bail!("github_api_url must start with http:// or https://");
        }

        if self.github_repository.split('/').count() != 2 {
            anyhow::bail!("github_repository must be an owner/name slug");
        }

        if self.ci_config_dir.is_empty() || self.ci_config_dir.contains('/') {
            anyhow::bail!("ci_config_dir must be a single top-level directory");
        }

        if let Some(anchore) = &self.anchore {
            if !anchore.url.starts_with("http://") && !anchore.url.starts_with("https://") {
                anyhow::bail!("anchore url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            dry_run: false,
            namespace: "biocontainers".to_string(),
            registry_url: None,
            dockerhub: None,
            anchore: None,
            metadata: None,
            object_store: None,
            singularity_tmp: None,
            convert_dir: PathBuf::from("/tmp"),
            github_token: None,
            github_repository: "BioContainers/containers".to_string(),
            github_api_url: dockyard_client::DEFAULT_API_URL.to_string(),
            restricted_paths: vec![".aws".to_string(), "etc/biocontainers-ci".to_string()],
            ci_config_dir: ".github".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.namespace, "biocontainers");
        assert!(!config.dry_run);
        assert_eq!(config.restricted_paths, vec![".aws", "etc/biocontainers-ci"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = from_pairs(&[
            ("GITHUB_WORKSPACE", "/src/containers"),
            ("DRY_RUN", "true"),
            ("REGISTRY_URL", "registry.local:5000/"),
            ("DOCKERHUB_USERNAME", "bot"),
            ("DOCKERHUB_PASSWORD", "pw"),
            ("ANCHORE_URL", "http://anchore:8228/v1"),
            ("BIOTOOLS_TOKEN", "tok"),
            ("METADATA_FORMAT", "json"),
            ("METADATA_LAYOUT", "single"),
            ("S3_BUCKET", "sing"),
            ("RESTRICTED_PATHS", ".aws, secrets/ ,"),
        ])
        .unwrap();

        assert_eq!(config.workdir, PathBuf::from("/src/containers"));
        assert!(config.dry_run);
        assert_eq!(config.registry_url.as_deref(), Some("registry.local:5000"));
        assert_eq!(config.dockerhub.as_ref().unwrap().password, "pw");
        assert_eq!(config.anchore.as_ref().unwrap().image, "biocontainers/anchore-cli");

        let metadata = config.metadata.as_ref().unwrap();
        assert_eq!(metadata.format, MetadataFormat::Json);
        assert_eq!(metadata.layout, MetadataLayout::Single);
        assert_eq!(metadata.repository, "bio-tools/content");

        assert_eq!(config.object_store.as_ref().unwrap().bucket, "sing");
        assert_eq!(config.restricted_paths, vec![".aws", "secrets/"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = from_pairs(&[("DOCKERHUB_USERNAME", "  "), ("IMAGE_NAMESPACE", "")]).unwrap();
        assert!(config.dockerhub.is_none());
        assert_eq!(config.namespace, "biocontainers");
    }

    #[test]
    fn test_invalid_metadata_format() {
        assert!(from_pairs(&[("BIOTOOLS_TOKEN", "t"), ("METADATA_FORMAT", "toml")]).is_err());
        assert!(from_pairs(&[("METADATA_FORMAT", "toml")]).is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.namespace = "Bio Containers".to_string();
        assert!(config.validate().is_err());
        config.namespace = "biocontainers".to_string();

        config.github_api_url = "api.github.com".to_string();
        assert!(config.validate().is_err());
        config.github_api_url = "https://api.github.com".to_string();

        config.ci_config_dir = ".github/workflows".to_string();
        assert!(config.validate().is_err());
    }
}
