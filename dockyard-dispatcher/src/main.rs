//! Dockyard Dispatcher
//!
//! Webhook receiver of the container-recipe CI. Each delivery is turned into
//! build requests, and each request triggers one remote build.

use dockyard_client::{GitHubClient, GitHubReporter, TriggerClient};
use dockyard_core::{ChangeExtractor, DispatchConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod service;

use crate::config::Config;
use crate::service::dispatch_service::DispatchService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dockyard_dispatcher=debug,dockyard_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dockyard Dispatcher...");

    let config = Config::from_env();
    config.validate()?;

    let github = GitHubClient::new(
        config.github_api_url.clone(),
        config.github_repository.clone(),
        config.github_token.clone(),
    );
    let reporter = GitHubReporter::new(github.clone());
    if !reporter.is_enabled() {
        tracing::debug!("No GitHub token, rejections will not be commented");
    }

    let extractor = ChangeExtractor::new(
        DispatchConfig {
            ci_config_dir: config.ci_config_dir.clone(),
        },
        Arc::new(reporter),
    );
    let trigger = TriggerClient::new(
        config.trigger_url.clone(),
        config.push_job.clone(),
        config.pr_job.clone(),
    );
    tracing::info!(
        "Triggering {} and {} at {}",
        config.push_job,
        config.pr_job,
        config.trigger_url
    );

    let service = DispatchService::new(extractor, github, Arc::new(trigger));

    // Build router with all API endpoints
    let app = api::create_router(Arc::new(service));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
