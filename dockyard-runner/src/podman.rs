//! Podman image management
//!
//! Implements the image operations the pipeline needs on the local image store:
//! - Building a recipe directory into a tagged image
//! - Reading image labels
//! - Running test commands in throwaway containers
//! - Pushing to registries
//! - Removing tags and pruning dangling images and containers

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dockyard_core::domain::labels::LabelSet;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, error, info, warn};

use crate::config::RegistryAuth;

/// Mount point of the recipe repository inside test containers
pub const RECIPES_MOUNT: &str = "/biocontainers";

/// Result of a successful build
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub image_id: String,
    /// Builder output, one entry per line
    pub log: Vec<String>,
}

/// Result of one test command
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub success: bool,
    pub output: String,
}

/// Local image store used by the build pipeline
///
/// Calls block for the duration of the underlying tool invocation.
pub trait ImageStore: Send + Sync {
    /// Builds `context` into an image tagged `tag`
    fn build(&self, context: &Path, tag: &str, no_cache: bool) -> Result<BuildOutput>;

    /// Labels declared by `image`
    fn labels(&self, image: &str) -> Result<LabelSet>;

    /// Runs `command` in a throwaway container of `image` with `recipes` mounted read-only
    fn run_test(&self, image: &str, command: &str, recipes: &Path) -> Result<TestOutcome>;

    /// Pushes `name` to the registry it names
    fn push(&self, name: &str, auth: Option<&RegistryAuth>) -> Result<()>;

    /// Removes the local tag `name`
    fn remove(&self, name: &str) -> Result<()>;

    /// Prunes dangling images and stopped containers, best effort
    fn prune(&self);
}

/// Checks if podman is installed and available
pub fn check_podman_available() -> Result<()> {
    let output = Command::new("podman")
        .arg("--version")
        .output()
        .context("Failed to execute 'podman --version'. Is podman installed?")?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

/// Fully qualified push destination; short names go to docker.io
fn qualified(name: &str) -> String {
    let host = name.split('/').next().unwrap_or_default();
    if name.contains('/') && (host.contains('.') || host.contains(':') || host == "localhost") {
        name.to_string()
    } else {
        format!("docker.io/{}", name)
    }
}

/// Registry host of a qualified image name
fn registry_host(qualified: &str) -> &str {
    qualified.split('/').next().unwrap_or_default()
}

/// Containers auth file content granting `auth` on `registry`
fn auth_file_content(registry: &str, auth: &RegistryAuth) -> serde_json::Value {
    let token = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
    serde_json::json!({ "auths": { registry: { "auth": token } } })
}

/// Writes a private auth file; removed when the handle drops
fn write_auth_file(registry: &str, auth: &RegistryAuth) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new().context("Failed to create registry auth file")?;
    serde_json::to_writer(&mut file, &auth_file_content(registry, auth))
        .context("Failed to write registry auth file")?;
    file.flush().context("Failed to write registry auth file")?;
    Ok(file)
}

/// `ImageStore` driving the podman CLI
#[derive(Debug, Clone, Default)]
pub struct PodmanImageStore;

impl PodmanImageStore {
    pub fn new() -> Self {
        Self
    }

    /// Runs podman, logging its output
    fn podman(&self, args: &[&str]) -> Result<Output> {
        debug!("podman {}", args.join(" "));

        let output = Command::new("podman")
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute podman {}", args.first().unwrap_or(&"")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("podman {} stderr: {}", args.first().unwrap_or(&""), stderr.trim());
        }

        Ok(output)
    }

    /// Runs podman and fails on a non-zero exit
    fn podman_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.podman(args)?;

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let error_msg = format!(
                "podman {} failed: exit_code={}, stderr='{}'",
                args.first().unwrap_or(&""),
                exit_code,
                String::from_utf8_lossy(&output.stderr).trim()
            );

            error!("{}", error_msg);
            anyhow::bail!("{}", error_msg);
        }

        Ok(output)
    }
}

impl ImageStore for PodmanImageStore {
    fn build(&self, context: &Path, tag: &str, no_cache: bool) -> Result<BuildOutput> {
        let context = context.to_string_lossy();
        let mut args = vec!["build", "--rm", "-t", tag];
        if no_cache {
            args.push("--no-cache");
        }
        args.push(&context);

        info!("Building {} from {}", tag, context);
        let output = self.podman_checked(&args)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let log: Vec<String> = stdout.lines().map(String::from).collect();
        let image_id = log
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_default();

        info!("Built {} ({})", tag, image_id);
        Ok(BuildOutput { image_id, log })
    }

    fn labels(&self, image: &str) -> Result<LabelSet> {
        let output =
            self.podman_checked(&["image", "inspect", "--format", "{{json .Labels}}", image])?;

        let raw = String::from_utf8_lossy(&output.stdout);
        let labels: Option<LabelSet> = serde_json::from_str(raw.trim())
            .with_context(|| format!("Invalid labels for {}: {}", image, raw.trim()))?;

        Ok(labels.unwrap_or_default())
    }

    fn run_test(&self, image: &str, command: &str, recipes: &Path) -> Result<TestOutcome> {
        let mount = format!("{}:{}:ro", recipes.to_string_lossy(), RECIPES_MOUNT);
        let output = self.podman(&[
            "run",
            "--rm",
            "-v",
            &mount,
            "--entrypoint",
            "/bin/sh",
            image,
            "-c",
            command,
        ])?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(TestOutcome {
            success: output.status.success(),
            output: text,
        })
    }

    fn push(&self, name: &str, auth: Option<&RegistryAuth>) -> Result<()> {
        let target = qualified(name);
        let destination = format!("docker://{}", target);
        let auth_file = auth
            .map(|a| write_auth_file(registry_host(&target), a))
            .transpose()?;
        let auth_path = auth_file
            .as_ref()
            .map(|f| f.path().to_string_lossy().to_string());

        let mut args = vec!["push"];
        if let Some(path) = &auth_path {
            args.push("--authfile");
            args.push(path);
        }
        args.push(name);
        args.push(&destination);

        info!("Pushing {}", name);
        self.podman_checked(&args)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.podman_checked(&["rmi", "-f", name])?;
        debug!("Image {} removed", name);
        Ok(())
    }

    fn prune(&self) {
        for args in [["image", "prune", "-f"], ["container", "prune", "-f"]] {
            match self.podman(&args) {
                Ok(output) if output.status.success() => debug!("podman {} done", args.join(" ")),
                Ok(output) => warn!(
                    "podman {} failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                Err(e) => warn!("podman {} failed: {}", args.join(" "), e),
            }
        }
    }
}
