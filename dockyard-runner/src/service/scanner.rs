//! Anchore security scanner

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use super::{SecurityScanner, run_tool};
use crate::config::AnchoreConfig;

/// Adds images to an Anchore engine through the anchore CLI image
pub struct AnchoreScanner {
    config: AnchoreConfig,
}

impl AnchoreScanner {
    pub fn new(config: AnchoreConfig) -> Self {
        Self { config }
    }

    fn command(&self, reference: &str) -> Command {
        let mut command = Command::new("podman");
        command
            .arg("run")
            .arg("--rm")
            .arg("-e")
            .arg(format!("ANCHORE_CLI_URL={}", self.config.url))
            .arg("-e")
            .arg(format!("ANCHORE_CLI_USER={}", self.config.username))
            .arg("-e")
            .arg(format!("ANCHORE_CLI_PASS={}", self.config.password))
            .arg(&self.config.image)
            .arg("anchore-cli")
            .arg("image")
            .arg("add")
            .arg(reference);
        command
    }
}

#[async_trait]
impl SecurityScanner for AnchoreScanner {
    async fn scan_image(&self, reference: &str) -> Result<String> {
        info!("Submitting {} to {}", reference, self.config.url);
        run_tool(&mut self.command(reference), "anchore-cli").await
    }
}
