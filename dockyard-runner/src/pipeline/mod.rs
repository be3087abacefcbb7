//! Build pipeline
//!
//! Carries one build request through the ordered stages:
//!
//! `BUILD → VALIDATE_LABELS → TEST → STOP_IF_PR → TAG → PUSH → SCAN →
//! REGISTER_METADATA → CONVERT → CLEANUP → DONE`
//!
//! Any fatal stage error skips straight to `CLEANUP`. Scan errors are only
//! logged. Cleanup runs on every path, including panics and dropped futures,
//! through `CleanupGuard`.

mod guard;

pub use guard::CleanupGuard;

use dockyard_core::advisory::AdvisorySource;
use dockyard_core::domain::labels::LabelSet;
use dockyard_core::domain::log::LogEntry;
use dockyard_core::domain::request::{BuildRequest, DOCKERFILE};
use dockyard_core::domain::run::{PipelineRun, RunStatus, Stage};
use dockyard_core::reporter::{Reporter, StatusState};
use dockyard_core::validate::LabelValidator;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::context::Context;
use crate::error::PipelineError;
use crate::naming;
use crate::podman::ImageStore;
use crate::service::{Converter, MetadataRegistry, SecurityScanner, Uploader};

/// Test command manifest inside a recipe directory
pub const TEST_MANIFEST: &str = "test-cmds.txt";

/// Comment posted when a recipe has no test manifest
pub const NO_TESTS_MESSAGE: &str = "No test-cmds.txt (test file) present, skipping tests";

/// Comment posted when a Dockerfile references a restricted path
pub const RESTRICTED_MESSAGE: &str = "Forbidden access to restricted files in Dockerfile";

/// Status detail posted when every test command passed
pub const TESTS_PASSED_MESSAGE: &str = "All tests successful!";

/// First restricted path referenced by a Dockerfile, if any
pub fn restricted_reference<'a>(dockerfile: &str, restricted: &'a [String]) -> Option<&'a str> {
    dockerfile.lines().find_map(|line| {
        restricted
            .iter()
            .find(|path| line.contains(path.as_str()))
            .map(String::as_str)
    })
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub request: BuildRequest,
    /// Stages entered, in order
    pub stages: Vec<Stage>,
    pub tag: Option<String>,
    pub status: RunStatus,
    pub error: Option<PipelineError>,
    pub logs: Vec<LogEntry>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn reached(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Runs build requests through the pipeline stages
pub struct BuildPipeline {
    config: Arc<Config>,
    images: Arc<dyn ImageStore>,
    reporter: Arc<dyn Reporter>,
    validator: LabelValidator,
    scanner: Option<Arc<dyn SecurityScanner>>,
    converter: Option<Arc<dyn Converter>>,
    uploader: Option<Arc<dyn Uploader>>,
    metadata: Option<Arc<dyn MetadataRegistry>>,
}

impl BuildPipeline {
    /// Creates a pipeline without optional integrations
    ///
    /// # Arguments
    /// * `config` - Immutable runner configuration
    /// * `images` - Local image store
    /// * `reporter` - Status and comment sink
    /// * `advisories` - Lookups behind label advisories
    pub fn new(
        config: Arc<Config>,
        images: Arc<dyn ImageStore>,
        reporter: Arc<dyn Reporter>,
        advisories: Arc<dyn AdvisorySource>,
    ) -> Self {
        Self {
            validator: LabelValidator::new(reporter.clone(), advisories),
            config,
            images,
            reporter,
            scanner: None,
            converter: None,
            uploader: None,
            metadata: None,
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn SecurityScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_metadata_registry(mut self, metadata: Arc<dyn MetadataRegistry>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Runs `request` to completion
    ///
    /// Never fails: the outcome, including the fatal error if any, is in the
    /// summary. Failures not yet reported by their stage are reported here.
    pub async fn run(&self, request: BuildRequest) -> RunSummary {
        let mut run = PipelineRun::new(request);
        let ctx = Context::new(run.id, run.request.container());
        let guard = CleanupGuard::new(self.images.clone());
        ctx.log_info(format!("Starting pipeline for {}", run.request));

        let result = self.execute(&mut run, &ctx, &guard).await;

        if let Err(e) = &result {
            ctx.log_error(format!("Stage {} failed: {}", run.stage(), e));
            run.enter(Stage::Cleanup);
            ctx.log_info(format!("Starting stage {}", Stage::Cleanup));
        } else {
            self.enter(&mut run, &ctx, Stage::Cleanup);
        }
        guard.cleanup();

        let status = match &result {
            Ok(()) => RunStatus::Success,
            Err(e) => {
                if !e.is_reported() {
                    self.reporter
                        .report_status(
                            run.request.trigger_ref(),
                            &ctx.subject(),
                            StatusState::Failure,
                            &[e.to_string()],
                        )
                        .await;
                }
                RunStatus::Failure
            }
        };
        run.finish(status);
        ctx.log_info(format!("Pipeline for {} finished: {}", run.request, status));

        RunSummary {
            run_id: run.id,
            stages: run.visited().to_vec(),
            tag: run.tag().map(String::from),
            status,
            error: result.err(),
            logs: ctx.drain_logs(),
            request: run.request,
        }
    }

    fn enter(&self, run: &mut PipelineRun, ctx: &Context, stage: Stage) {
        let previous = run.stage();
        if previous != stage {
            ctx.log_info(format!("Stage {} completed", previous));
        }
        run.enter(stage);
        ctx.log_info(format!("Starting stage {}", stage));
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        ctx: &Context,
        guard: &CleanupGuard,
    ) -> Result<(), PipelineError> {
        let request = run.request.clone();
        let namespace = self.config.namespace.as_str();
        let recipe_dir = self
            .config
            .workdir
            .join(request.container())
            .join(request.version());
        let base = naming::base_name(namespace, &request);

        self.enter(run, ctx, Stage::Build);
        guard.track(base.clone());
        self.build(&request, &recipe_dir, &base, ctx).await?;

        self.enter(run, ctx, Stage::ValidateLabels);
        let labels = self.images.labels(&base).map_err(|e| {
            PipelineError::BuildFailed(format!("failed to read labels of {}: {:#}", base, e))
        })?;
        let verdict = self.validator.validate(&request, &labels).await;
        ctx.set_subject(verdict.software.as_str());
        if !verdict.passed {
            return Err(PipelineError::LabelValidationFailed(
                verdict.defects.join(", "),
            ));
        }
        run.fix_tag(verdict.tag.as_str());
        let tag = verdict.tag;

        self.enter(run, ctx, Stage::Test);
        self.test(&request, &recipe_dir, &base, &verdict.software, ctx)
            .await?;

        self.enter(run, ctx, Stage::StopIfPr);
        if request.is_pull_request() {
            ctx.log_info("Pull request checks over");
            return Ok(());
        }

        self.enter(run, ctx, Stage::Tag);
        let public = naming::public_name(namespace, request.container(), &tag);
        let local = self
            .config
            .registry_url
            .as_deref()
            .map(|registry| naming::local_name(registry, namespace, request.container(), &tag));
        for name in std::iter::once(&public).chain(local.as_ref()) {
            guard.track(name.clone());
            let output = self.images.build(&recipe_dir, name, false).map_err(|e| {
                PipelineError::PublishFailed(format!("failed to tag {}: {:#}", name, e))
            })?;
            ctx.add_build_output(&output.log);
        }

        self.enter(run, ctx, Stage::Push);
        self.push(&public, local.as_deref(), ctx)?;

        self.enter(run, ctx, Stage::Scan);
        self.scan(&public, ctx).await;

        self.enter(run, ctx, Stage::RegisterMetadata);
        self.register_metadata(&request, &tag, &labels, ctx).await?;

        self.enter(run, ctx, Stage::Convert);
        self.convert(&request, &tag, &public, ctx).await
    }

    /// Posts a comment on the request's pull request, or logs it
    async fn comment(&self, request: &BuildRequest, ctx: &Context, body: &str) {
        match request.comment_target() {
            Some(target) => self.reporter.report_comment(&target, body).await,
            None => ctx.log_info(body),
        }
    }

    async fn build(
        &self,
        request: &BuildRequest,
        recipe_dir: &Path,
        base: &str,
        ctx: &Context,
    ) -> Result<(), PipelineError> {
        let dockerfile = recipe_dir.join(DOCKERFILE);
        let text = tokio::fs::read_to_string(&dockerfile).await.map_err(|e| {
            PipelineError::BuildFailed(format!("cannot read {}: {}", dockerfile.display(), e))
        })?;

        if let Some(path) = restricted_reference(&text, &self.config.restricted_paths) {
            self.comment(request, ctx, RESTRICTED_MESSAGE).await;
            return Err(PipelineError::BuildFailed(format!(
                "Dockerfile references restricted path {}",
                path
            )));
        }

        let output = self
            .images
            .build(recipe_dir, base, true)
            .map_err(|e| PipelineError::BuildFailed(format!("{:#}", e)))?;
        ctx.add_build_output(&output.log);
        ctx.log_info(format!("Built {} ({})", base, output.image_id));
        Ok(())
    }

    async fn test(
        &self,
        request: &BuildRequest,
        recipe_dir: &Path,
        base: &str,
        software: &str,
        ctx: &Context,
    ) -> Result<(), PipelineError> {
        let manifest = recipe_dir.join(TEST_MANIFEST);
        let content = match tokio::fs::read_to_string(&manifest).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.comment(request, ctx, NO_TESTS_MESSAGE).await;
                return Ok(());
            }
            Err(e) => {
                return Err(PipelineError::TestFailed(format!(
                    "cannot read {}: {}",
                    manifest.display(),
                    e
                )));
            }
        };

        let mut failed = Vec::new();
        for command in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            ctx.log_info(format!("Running test: {}", command));
            match self.images.run_test(base, command, &self.config.workdir) {
                Ok(outcome) if outcome.success => ctx.log_debug(outcome.output),
                Ok(outcome) => {
                    ctx.log_error(format!("Test failed: {}: {}", command, outcome.output.trim()));
                    failed.push(command.to_string());
                }
                Err(e) => {
                    ctx.log_error(format!("Test could not run: {}: {:#}", command, e));
                    failed.push(command.to_string());
                }
            }
        }

        if !failed.is_empty() {
            let message = format!("tests failed! {}", failed.join(";"));
            self.reporter
                .report_status(
                    request.trigger_ref(),
                    software,
                    StatusState::Failure,
                    &[message.clone()],
                )
                .await;
            return Err(PipelineError::TestFailed(message));
        }

        self.reporter
            .report_status(
                request.trigger_ref(),
                software,
                StatusState::Success,
                &[TESTS_PASSED_MESSAGE.to_string()],
            )
            .await;
        Ok(())
    }

    fn push(&self, public: &str, local: Option<&str>, ctx: &Context) -> Result<(), PipelineError> {
        match &self.config.dockerhub {
            Some(_) if self.config.dry_run => ctx.log_info(format!("Dry run, would push {}", public)),
            Some(auth) => {
                self.images.push(public, Some(auth)).map_err(|e| {
                    PipelineError::PublishFailed(format!("failed to push {}: {:#}", public, e))
                })?;
                ctx.log_info(format!("Pushed {}", public));
            }
            None => ctx.log_info("No public registry credentials, skipping push"),
        }

        match local {
            Some(name) if self.config.dry_run => ctx.log_info(format!("Dry run, would push {}", name)),
            Some(name) => {
                self.images.push(name, None).map_err(|e| {
                    PipelineError::PublishFailed(format!("failed to push {}: {:#}", name, e))
                })?;
                ctx.log_info(format!("Pushed {}", name));
            }
            None => ctx.log_info("No local registry, skipping push"),
        }

        Ok(())
    }

    async fn scan(&self, public: &str, ctx: &Context) {
        let Some(scanner) = &self.scanner else {
            ctx.log_info("Security scanner not configured, skipping");
            return;
        };

        match scanner.scan_image(&naming::scan_reference(public)).await {
            Ok(report) => ctx.log_info(format!("Scan submitted: {}", report.trim())),
            Err(e) => ctx.log_warning(format!("Scan failed, ignored: {:#}", e)),
        }
    }

    async fn register_metadata(
        &self,
        request: &BuildRequest,
        tag: &str,
        labels: &LabelSet,
        ctx: &Context,
    ) -> Result<(), PipelineError> {
        if self.config.dry_run {
            ctx.log_info("Dry run, metadata not registered");
            return Ok(());
        }
        let Some(metadata) = &self.metadata else {
            ctx.log_info("Metadata registry not configured, skipping");
            return Ok(());
        };

        metadata
            .record_version(request.container(), tag, labels)
            .await
            .map_err(|e| PipelineError::MetadataRegistrationFailed(format!("{:#}", e)))?;
        ctx.log_info(format!("Registered {}:{}", request.container(), tag));
        Ok(())
    }

    async fn convert(
        &self,
        request: &BuildRequest,
        tag: &str,
        public: &str,
        ctx: &Context,
    ) -> Result<(), PipelineError> {
        let Some(converter) = &self.converter else {
            ctx.log_info("Converter not configured, skipping");
            return Ok(());
        };

        let artifact = converter
            .convert(&naming::convert_source(public))
            .await
            .map_err(|e| PipelineError::ConversionFailed(format!("{:#}", e)))?;

        let result = self.upload(&artifact, request, tag, ctx).await;
        remove_artifact(&artifact, ctx).await;
        result
    }

    async fn upload(
        &self,
        artifact: &Path,
        request: &BuildRequest,
        tag: &str,
        ctx: &Context,
    ) -> Result<(), PipelineError> {
        if self.config.dry_run {
            ctx.log_info("Dry run, artifact not uploaded");
            return Ok(());
        }
        let Some(uploader) = &self.uploader else {
            ctx.log_warning("Object store not configured, artifact not uploaded");
            return Ok(());
        };

        let key = naming::artifact_key(request.container(), tag);
        uploader.upload(artifact, &key).await.map_err(|e| {
            PipelineError::ConversionFailed(format!("upload of {} failed: {:#}", key, e))
        })?;
        ctx.log_info(format!("Uploaded {}", key));
        Ok(())
    }
}

async fn remove_artifact(artifact: &Path, ctx: &Context) {
    match tokio::fs::remove_file(artifact).await {
        Ok(()) => ctx.log_debug(format!("Removed {}", artifact.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => ctx.log_warning(format!("Failed to remove {}: {}", artifact.display(), e)),
    }
}

#[cfg(test)]
mod tests;
