//! Object store upload

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

use super::{Uploader, run_tool};
use crate::config::ObjectStoreConfig;

/// Uploads artifacts to an S3-compatible store with the aws CLI
pub struct S3Uploader {
    config: ObjectStoreConfig,
}

impl S3Uploader {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self { config }
    }

    /// Destination URI of `key`
    pub fn destination(&self, key: &str) -> String {
        format!("s3://{}/{}", self.config.bucket, key)
    }

    fn command(&self, artifact: &Path, key: &str) -> Command {
        let mut command = Command::new("aws");
        command
            .arg("s3")
            .arg("cp")
            .arg(artifact)
            .arg(self.destination(key))
            .arg("--only-show-errors");

        if let Some(endpoint) = &self.config.endpoint {
            command.arg("--endpoint-url").arg(endpoint);
        }
        if let Some(region) = &self.config.region {
            command.arg("--region").arg(region);
        }
        if let Some(access_key) = &self.config.access_key {
            command.env("AWS_ACCESS_KEY_ID", access_key);
        }
        if let Some(secret) = &self.config.secret_access_key {
            command.env("AWS_SECRET_ACCESS_KEY", secret);
        }
        command
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, artifact: &Path, key: &str) -> Result<()> {
        info!("Uploading {} to {}", artifact.display(), self.destination(key));
        run_tool(&mut self.command(artifact, key), "aws s3 cp").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let uploader = S3Uploader::new(ObjectStoreConfig {
            bucket: "sing".to_string(),
            endpoint: Some("https://s3.example.org".to_string()),
            region: None,
            access_key: Some("key".to_string()),
            secret_access_key: None,
        });

        let key = "SingImgsRepo/bwa/0.7_cv1/bwa_0.7_cv1.sif";
        assert_eq!(
            uploader.destination(key),
            "s3://sing/SingImgsRepo/bwa/0.7_cv1/bwa_0.7_cv1.sif"
        );

        let command = uploader.command(Path::new("/tmp/a.sif"), key);
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args[..4], ["s3", "cp", "/tmp/a.sif", "s3://sing/SingImgsRepo/bwa/0.7_cv1/bwa_0.7_cv1.sif"]);
        assert!(args.contains(&"--endpoint-url".to_string()));
        assert!(!args.contains(&"--region".to_string()));
        assert_eq!(command.as_std().get_envs().count(), 1);
    }
}
