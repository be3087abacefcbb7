//! Build request domain types

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::domain::status::CommentTarget;

static CONTAINER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9_-]+$").expect("container name pattern is valid"));

/// Name of the recipe file inside a container directory
pub const DOCKERFILE: &str = "Dockerfile";

/// Returns true if `name` is usable as a container identifier
pub fn is_valid_container_name(name: &str) -> bool {
    CONTAINER_NAME.is_match(name)
}

/// A `container/version` recipe directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContainerDir {
    pub container: String,
    pub version: String,
}

impl ContainerDir {
    /// Normalizes a repository path to the container directory it belongs to.
    ///
    /// The container directory is made of the first two path segments. Paths
    /// with fewer than two segments do not belong to any container.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.strip_prefix("./").unwrap_or(path);
        let mut segments = path.split('/');
        let container = segments.next().filter(|s| !s.is_empty())?;
        let version = segments.next().filter(|s| !s.is_empty())?;

        Some(Self {
            container: container.to_string(),
            version: version.to_string(),
        })
    }

    /// True when the container segment is a valid container identifier
    pub fn has_valid_name(&self) -> bool {
        is_valid_container_name(&self.container)
    }

    /// Implicit Dockerfile location for this directory
    pub fn dockerfile_path(&self) -> String {
        format!("{}/{}/{}", self.container, self.version, DOCKERFILE)
    }
}

impl fmt::Display for ContainerDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.version)
    }
}

/// One build attempt for a `(container, version)` pair
///
/// The trigger reference is fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    container: String,
    version: String,
    trigger_ref: String,
    pull_request: Option<u64>,
}

impl BuildRequest {
    /// Request built from a pushed commit
    pub fn new(dir: ContainerDir, trigger_ref: impl Into<String>) -> Self {
        Self {
            container: dir.container,
            version: dir.version,
            trigger_ref: trigger_ref.into(),
            pull_request: None,
        }
    }

    /// Request built from a pull request; `head_sha` is the PR head commit
    pub fn for_pull_request(dir: ContainerDir, head_sha: impl Into<String>, number: u64) -> Self {
        Self {
            pull_request: Some(number),
            ..Self::new(dir, head_sha)
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Commit SHA (or PR head SHA) that caused this request
    pub fn trigger_ref(&self) -> &str {
        &self.trigger_ref
    }

    pub fn pull_request(&self) -> Option<u64> {
        self.pull_request
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    /// Recipe directory relative to the repository root
    pub fn dir(&self) -> ContainerDir {
        ContainerDir {
            container: self.container.clone(),
            version: self.version.clone(),
        }
    }

    /// Where advisory comments for this request go, if anywhere
    pub fn comment_target(&self) -> Option<CommentTarget> {
        self.pull_request.map(CommentTarget::PullRequest)
    }
}

impl fmt::Display for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pull_request {
            Some(number) => write!(
                f,
                "{}/{} (PR #{} @ {})",
                self.container, self.version, number, self.trigger_ref
            ),
            None => write!(f, "{}/{} (@ {})", self.container, self.version, self.trigger_ref),
        }
    }
}
