//! Singularity image conversion

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Converter, run_tool};

/// Builds SIF artifacts from registry images with the singularity CLI
pub struct SingularityConverter {
    /// Directory receiving artifacts
    output_dir: PathBuf,
    /// Cache and temporary directory of the tool
    tmp_dir: Option<PathBuf>,
}

impl SingularityConverter {
    pub fn new(output_dir: impl Into<PathBuf>, tmp_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            tmp_dir,
        }
    }

    /// Fresh artifact path; concurrent conversions never share one
    fn artifact_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("singimage-{}.sif", Uuid::new_v4().simple()))
    }

    fn command(&self, artifact: &Path, source: &str) -> Command {
        let mut command = Command::new("singularity");
        command.arg("build").arg(artifact).arg(source);
        if let Some(tmp) = &self.tmp_dir {
            command
                .env("SINGULARITY_CACHEDIR", tmp)
                .env("SINGULARITY_TMPDIR", tmp);
        }
        command
    }
}

#[async_trait]
impl Converter for SingularityConverter {
    async fn convert(&self, source: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let artifact = self.artifact_path();
        info!("Converting {} to {}", source, artifact.display());

        if let Err(e) = run_tool(&mut self.command(&artifact, source), "singularity").await {
            if tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
                if let Err(rm) = tokio::fs::remove_file(&artifact).await {
                    warn!("Failed to remove partial artifact {}: {}", artifact.display(), rm);
                }
            }
            return Err(e);
        }

        Ok(artifact)
    }
}
