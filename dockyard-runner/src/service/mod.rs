//! Service layer
//!
//! External capabilities consumed by the build pipeline past the local image
//! store: security scanning, artifact conversion, object store upload and
//! metadata registration.
//!
//! All services are trait-based to enable testing and dependency injection.

mod converter;
mod metadata;
mod scanner;
mod uploader;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dockyard_core::domain::labels::LabelSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

// Re-export implementations
pub use converter::SingularityConverter;
pub use metadata::{BOT_LABEL, MetadataBot, MetadataFile, SoftwareEntry, VersionEntry};
pub use scanner::AnchoreScanner;
pub use uploader::S3Uploader;

/// Submits images to a security scanner
#[async_trait]
pub trait SecurityScanner: Send + Sync {
    /// Submits `reference` and returns the scanner's report
    async fn scan_image(&self, reference: &str) -> Result<String>;
}

/// Produces a single-file artifact from a published image
#[async_trait]
pub trait Converter: Send + Sync {
    /// Converts `source` and returns the local artifact path
    async fn convert(&self, source: &str) -> Result<PathBuf>;
}

/// Stores artifacts in an object store
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, artifact: &Path, key: &str) -> Result<()>;
}

/// Records published versions in the metadata registry
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    async fn record_version(&self, container: &str, tag: &str, labels: &LabelSet) -> Result<()>;
}

/// Runs an external tool and returns its stdout, failing on a non-zero exit
pub(crate) async fn run_tool(command: &mut Command, tool: &str) -> Result<String> {
    let output = command
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", tool))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stdout.trim().is_empty() {
        debug!("{} stdout: {}", tool, stdout.trim());
    }
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", tool, stderr.trim());
    }

    if !output.status.success() {
        anyhow::bail!(
            "{} failed: exit_code={}, stderr='{}'",
            tool,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }

    Ok(stdout)
}
