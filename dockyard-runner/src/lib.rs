//! Dockyard Runner
//!
//! Runs build requests through the build pipeline on a host with podman.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Podman: Local image store (build, labels, tests, push, cleanup)
//! - Services: Scanner, converter, object store upload, metadata registry
//! - Pipeline: The per-request stage machine and its cleanup guard
//! - Source: What a CLI invocation dispatches

pub mod config;
pub mod context;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod podman;
pub mod service;
pub mod source;

use dockyard_core::advisory::AdvisorySource;
use dockyard_core::reporter::Reporter;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::BuildPipeline;
use crate::podman::ImageStore;
use crate::service::{AnchoreScanner, MetadataBot, S3Uploader, SingularityConverter};

/// Wires a pipeline with every integration the configuration enables
pub fn configured_pipeline(
    config: Arc<Config>,
    images: Arc<dyn ImageStore>,
    reporter: Arc<dyn Reporter>,
    advisories: Arc<dyn AdvisorySource>,
) -> BuildPipeline {
    let mut pipeline = BuildPipeline::new(config.clone(), images, reporter, advisories)
        .with_converter(Arc::new(SingularityConverter::new(
            config.convert_dir.clone(),
            config.singularity_tmp.clone(),
        )));

    match &config.anchore {
        Some(anchore) => {
            pipeline = pipeline.with_scanner(Arc::new(AnchoreScanner::new(anchore.clone())));
        }
        None => info!("No security scanner configured"),
    }

    match &config.object_store {
        Some(store) => pipeline = pipeline.with_uploader(Arc::new(S3Uploader::new(store.clone()))),
        None => warn!("No object store configured, converted artifacts will not be uploaded"),
    }

    if let Some(metadata) = &config.metadata {
        let bot = MetadataBot::new(metadata.clone(), config.namespace.clone(), &config.github_api_url);
        if bot.has_ssh_key() {
            pipeline = pipeline.with_metadata_registry(Arc::new(bot));
        } else {
            warn!(
                "Metadata deploy key {} not found, metadata registration disabled",
                metadata.ssh_key.display()
            );
        }
    }

    pipeline
}
