use super::*;
use crate::config::RegistryAuth;
use crate::podman::{BuildOutput, TestOutcome};
use async_trait::async_trait;
use dockyard_core::advisory::NoAdvisories;
use dockyard_core::domain::log::LogLevel;
use dockyard_core::domain::request::ContainerDir;
use dockyard_core::domain::status::CommentTarget;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const PLAIN_DOCKERFILE: &str = "FROM biocontainers/biocontainers:v1.2.0\nRUN conda install samtools=1.9\n";

fn valid_labels() -> Vec<(&'static str, &'static str)> {
    vec![
        ("software", "samtools"),
        ("software.version", "1.9"),
        ("version", "2"),
        ("base_image", "biocontainers/biocontainers:v1.2.0"),
        ("about.summary", "Tools for SAM/BAM files"),
        ("about.home", "http://www.htslib.org"),
        ("about.license", "MIT"),
        ("about.license_file", "/usr/share/doc/samtools/LICENSE"),
    ]
}

fn push_request() -> BuildRequest {
    BuildRequest::new(ContainerDir::from_path("samtools/1.9").unwrap(), "abc123")
}

fn pr_request() -> BuildRequest {
    BuildRequest::for_pull_request(ContainerDir::from_path("samtools/1.9").unwrap(), "def456", 42)
}

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeImages {
    labels: Vec<(&'static str, &'static str)>,
    fail_build: bool,
    failing_command: Option<&'static str>,
    builds: Mutex<Vec<(String, bool)>>,
    tests: Mutex<Vec<String>>,
    pushes: Mutex<Vec<(String, bool)>>,
    removed: Mutex<Vec<String>>,
    prunes: AtomicUsize,
}

impl FakeImages {
    fn with_labels(labels: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            labels,
            ..Default::default()
        }
    }
}

impl ImageStore for FakeImages {
    fn build(&self, _context: &Path, tag: &str, no_cache: bool) -> anyhow::Result<BuildOutput> {
        if self.fail_build {
            anyhow::bail!("podman build failed: exit_code=125");
        }
        self.builds.lock().unwrap().push((tag.to_string(), no_cache));
        Ok(BuildOutput {
            image_id: "4b825dc642cb".to_string(),
            log: vec!["STEP 1/2: FROM biocontainers/biocontainers:v1.2.0".to_string()],
        })
    }

    fn labels(&self, _image: &str) -> anyhow::Result<LabelSet> {
        Ok(self.labels.iter().copied().collect())
    }

    fn run_test(&self, _image: &str, command: &str, _recipes: &Path) -> anyhow::Result<TestOutcome> {
        self.tests.lock().unwrap().push(command.to_string());
        let success = self.failing_command != Some(command);
        Ok(TestOutcome {
            success,
            output: if success { "ok\n" } else { "exit 1\n" }.to_string(),
        })
    }

    fn push(&self, name: &str, auth: Option<&RegistryAuth>) -> anyhow::Result<()> {
        self.pushes
            .lock()
            .unwrap()
            .push((name.to_string(), auth.is_some()));
        Ok(())
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn prune(&self) {
        self.prunes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingReporter {
    statuses: Mutex<Vec<(String, String, StatusState, Vec<String>)>>,
    comments: Mutex<Vec<(CommentTarget, String)>>,
}

impl RecordingReporter {
    fn statuses(&self) -> Vec<(String, String, StatusState, Vec<String>)> {
        self.statuses.lock().unwrap().clone()
    }

    fn comments(&self) -> Vec<(CommentTarget, String)> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report_status(&self, commit: &str, subject: &str, state: StatusState, details: &[String]) {
        self.statuses.lock().unwrap().push((
            commit.to_string(),
            subject.to_string(),
            state,
            details.to_vec(),
        ));
    }

    async fn report_comment(&self, target: &CommentTarget, body: &str) {
        self.comments
            .lock()
            .unwrap()
            .push((target.clone(), body.to_string()));
    }
}

#[derive(Default)]
struct FakeScanner {
    fail: bool,
    scanned: Mutex<Vec<String>>,
}

#[async_trait]
impl SecurityScanner for FakeScanner {
    async fn scan_image(&self, reference: &str) -> anyhow::Result<String> {
        self.scanned.lock().unwrap().push(reference.to_string());
        if self.fail {
            anyhow::bail!("anchore-cli failed: exit_code=1");
        }
        Ok("Image added".to_string())
    }
}

struct FakeConverter {
    dir: PathBuf,
    produced: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, _source: &str) -> anyhow::Result<PathBuf> {
        let artifact = self.dir.join("singimage-test.sif");
        tokio::fs::write(&artifact, b"SIF").await?;
        self.produced.lock().unwrap().push(artifact.clone());
        Ok(artifact)
    }
}

#[derive(Default)]
struct FakeUploader {
    fail: bool,
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, artifact: &Path, key: &str) -> anyhow::Result<()> {
        assert!(artifact.exists(), "artifact must exist while uploading");
        if self.fail {
            anyhow::bail!("aws failed: exit_code=1, stderr='Access Denied'");
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeMetadata {
    fail: bool,
    recorded: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MetadataRegistry for FakeMetadata {
    async fn record_version(&self, container: &str, tag: &str, _labels: &LabelSet) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("git push failed");
        }
        self.recorded
            .lock()
            .unwrap()
            .push((container.to_string(), tag.to_string()));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    images: Arc<FakeImages>,
    reporter: Arc<RecordingReporter>,
    scanner: Arc<FakeScanner>,
    converter: Arc<FakeConverter>,
    uploader: Arc<FakeUploader>,
    metadata: Arc<FakeMetadata>,
    recipes: TempDir,
    _artifacts: TempDir,
}

impl Harness {
    fn new(images: FakeImages, dockerfile: &str, manifest: Option<&str>) -> Self {
        let recipes = tempfile::tempdir().unwrap();
        let recipe = recipes.path().join("samtools").join("1.9");
        std::fs::create_dir_all(&recipe).unwrap();
        std::fs::write(recipe.join(DOCKERFILE), dockerfile).unwrap();
        if let Some(manifest) = manifest {
            std::fs::write(recipe.join(TEST_MANIFEST), manifest).unwrap();
        }

        let artifacts = tempfile::tempdir().unwrap();
        Self {
            images: Arc::new(images),
            reporter: Arc::new(RecordingReporter::default()),
            scanner: Arc::new(FakeScanner::default()),
            converter: Arc::new(FakeConverter {
                dir: artifacts.path().to_path_buf(),
                produced: Mutex::new(Vec::new()),
            }),
            uploader: Arc::new(FakeUploader::default()),
            metadata: Arc::new(FakeMetadata::default()),
            recipes,
            _artifacts: artifacts,
        }
    }

    fn config(&self) -> Config {
        Config {
            workdir: self.recipes.path().to_path_buf(),
            registry_url: Some("registry.local:5000".to_string()),
            dockerhub: Some(RegistryAuth {
                username: "bot".to_string(),
                password: "secret".to_string(),
            }),
            ..Config::default()
        }
    }

    fn pipeline(&self, config: Config) -> BuildPipeline {
        BuildPipeline::new(
            Arc::new(config),
            self.images.clone(),
            self.reporter.clone(),
            Arc::new(NoAdvisories),
        )
        .with_scanner(self.scanner.clone())
        .with_converter(self.converter.clone())
        .with_uploader(self.uploader.clone())
        .with_metadata_registry(self.metadata.clone())
    }

    fn prunes(&self) -> usize {
        self.images.prunes.load(Ordering::SeqCst)
    }

    fn artifacts_left(&self) -> usize {
        self.converter
            .produced
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.exists())
            .count()
    }
}

// ============================================================================
// Runs
// ============================================================================

#[test]
fn test_restricted_reference() {
    let restricted = vec![".aws".to_string(), "etc/biocontainers-ci".to_string()];
    assert_eq!(
        restricted_reference("FROM x\nCOPY .aws/credentials /root/\n", &restricted),
        Some(".aws")
    );
    assert_eq!(restricted_reference(PLAIN_DOCKERFILE, &restricted), None);
    assert_eq!(restricted_reference(PLAIN_DOCKERFILE, &[]), None);
}

#[tokio::test]
async fn test_push_request_runs_every_stage() {
    let mut harness = Harness::new(
        FakeImages::with_labels(valid_labels()),
        PLAIN_DOCKERFILE,
        Some("samtools --version\n\nsamtools view --help\n"),
    );
    harness.scanner = Arc::new(FakeScanner {
        fail: true,
        ..Default::default()
    });

    let summary = harness.pipeline(harness.config()).run(push_request()).await;

    assert!(summary.is_success(), "{:?}", summary.error);
    assert_eq!(summary.tag.as_deref(), Some("1.9_cv2"));
    assert_eq!(
        summary.stages,
        vec![
            Stage::Build,
            Stage::ValidateLabels,
            Stage::Test,
            Stage::StopIfPr,
            Stage::Tag,
            Stage::Push,
            Stage::Scan,
            Stage::RegisterMetadata,
            Stage::Convert,
            Stage::Cleanup,
            Stage::Done,
        ]
    );

    assert_eq!(
        *harness.images.builds.lock().unwrap(),
        vec![
            ("biocontainers/samtools:1.9".to_string(), true),
            ("biocontainers/samtools:1.9_cv2".to_string(), false),
            ("registry.local:5000/biocontainers/samtools:1.9_cv2".to_string(), false),
        ]
    );
    assert_eq!(
        *harness.images.tests.lock().unwrap(),
        vec!["samtools --version", "samtools view --help"]
    );
    assert_eq!(
        *harness.images.pushes.lock().unwrap(),
        vec![
            ("biocontainers/samtools:1.9_cv2".to_string(), true),
            ("registry.local:5000/biocontainers/samtools:1.9_cv2".to_string(), false),
        ]
    );
    assert_eq!(
        *harness.scanner.scanned.lock().unwrap(),
        vec!["docker.io/biocontainers/samtools:1.9_cv2"]
    );
    assert_eq!(
        *harness.metadata.recorded.lock().unwrap(),
        vec![("samtools".to_string(), "1.9_cv2".to_string())]
    );
    assert_eq!(
        *harness.uploader.keys.lock().unwrap(),
        vec!["SingImgsRepo/samtools/1.9_cv2/samtools_1.9_cv2.sif"]
    );
    assert_eq!(harness.artifacts_left(), 0);

    assert_eq!(harness.prunes(), 1);
    assert_eq!(harness.images.removed.lock().unwrap().len(), 3);

    let statuses = harness.reporter.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].2, StatusState::Success);
    assert_eq!(
        statuses[1],
        (
            "abc123".to_string(),
            "samtools".to_string(),
            StatusState::Success,
            vec![TESTS_PASSED_MESSAGE.to_string()]
        )
    );

    assert!(summary
        .logs
        .iter()
        .any(|l| l.level == LogLevel::Warning && l.message.starts_with("Scan failed")));
}

#[tokio::test]
async fn test_failing_test_never_reaches_push() {
    let images = FakeImages {
        failing_command: Some("false"),
        ..FakeImages::with_labels(valid_labels())
    };
    let harness = Harness::new(images, PLAIN_DOCKERFILE, Some("samtools --version\nfalse\n"));

    let summary = harness.pipeline(harness.config()).run(push_request()).await;

    assert!(!summary.is_success());
    assert_eq!(
        summary.error,
        Some(PipelineError::TestFailed("tests failed! false".to_string()))
    );
    assert!(!summary.reached(Stage::Tag));
    assert!(!summary.reached(Stage::Push));
    assert!(summary.reached(Stage::Cleanup));
    assert_eq!(summary.stages.last(), Some(&Stage::Done));
    assert!(harness.images.pushes.lock().unwrap().is_empty());
    assert_eq!(harness.prunes(), 1);

    let statuses = harness.reporter.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[1].2, StatusState::Failure);
    assert_eq!(statuses[1].3, vec!["tests failed! false".to_string()]);
}

#[tokio::test]
async fn test_pull_request_stops_after_checks() {
    let harness = Harness::new(
        FakeImages::with_labels(valid_labels()),
        PLAIN_DOCKERFILE,
        Some("samtools --version\n"),
    );

    let summary = harness.pipeline(harness.config()).run(pr_request()).await;

    assert!(summary.is_success(), "{:?}", summary.error);
    assert!(summary.reached(Stage::StopIfPr));
    assert!(!summary.reached(Stage::Tag));
    assert_eq!(harness.images.builds.lock().unwrap().len(), 1);
    assert!(harness.images.pushes.lock().unwrap().is_empty());
    assert!(harness.scanner.scanned.lock().unwrap().is_empty());
    assert!(harness.metadata.recorded.lock().unwrap().is_empty());
    assert_eq!(harness.prunes(), 1);

    let statuses = harness.reporter.statuses();
    assert!(statuses.iter().all(|(sha, _, _, _)| sha == "def456"));
}

#[tokio::test]
async fn test_missing_manifest_skips_tests_with_comment() {
    let harness = Harness::new(FakeImages::with_labels(valid_labels()), PLAIN_DOCKERFILE, None);

    let summary = harness.pipeline(harness.config()).run(pr_request()).await;

    assert!(summary.is_success());
    assert!(harness.images.tests.lock().unwrap().is_empty());
    assert!(harness
        .reporter
        .comments()
        .contains(&(CommentTarget::PullRequest(42), NO_TESTS_MESSAGE.to_string())));
}

#[tokio::test]
async fn test_label_defects_stop_the_run() {
    let labels = valid_labels()
        .into_iter()
        .filter(|(k, _)| *k != "base_image")
        .collect();
    let harness = Harness::new(
        FakeImages::with_labels(labels),
        PLAIN_DOCKERFILE,
        Some("samtools --version\n"),
    );

    let summary = harness.pipeline(harness.config()).run(push_request()).await;

    assert!(matches!(
        summary.error,
        Some(PipelineError::LabelValidationFailed(_))
    ));
    assert!(!summary.reached(Stage::Test));
    assert_eq!(summary.tag, None);
    assert_eq!(harness.prunes(), 1);

    // The validator's status is the only one
    let statuses = harness.reporter.statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].2, StatusState::Failure);
    assert_eq!(statuses[0].3, vec!["base_image is missing in labels".to_string()]);
}

#[tokio::test]
async fn test_restricted_dockerfile_is_rejected() {
    let harness = Harness::new(
        FakeImages::with_labels(valid_labels()),
        "FROM biocontainers/biocontainers:v1.2.0\nCOPY .aws/credentials /root/.aws/\n",
        None,
    );

    let summary = harness.pipeline(harness.config()).run(pr_request()).await;

    assert!(matches!(summary.error, Some(PipelineError::BuildFailed(_))));
    assert!(harness.images.builds.lock().unwrap().is_empty());
    assert_eq!(
        harness.reporter.comments(),
        vec![(CommentTarget::PullRequest(42), RESTRICTED_MESSAGE.to_string())]
    );
    assert_eq!(harness.prunes(), 1);

    let statuses = harness.reporter.statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].1, "samtools");
    assert_eq!(statuses[0].2, StatusState::Failure);
}

#[tokio::test]
async fn test_build_failure_goes_to_cleanup() {
    let images = FakeImages {
        fail_build: true,
        ..FakeImages::with_labels(valid_labels())
    };
    let harness = Harness::new(images, PLAIN_DOCKERFILE, None);

    let summary = harness.pipeline(harness.config()).run(push_request()).await;

    assert!(matches!(summary.error, Some(PipelineError::BuildFailed(_))));
    assert_eq!(summary.stages, vec![Stage::Build, Stage::Cleanup, Stage::Done]);
    assert_eq!(
        *harness.images.removed.lock().unwrap(),
        vec!["biocontainers/samtools:1.9".to_string()]
    );
    assert_eq!(harness.prunes(), 1);
    assert_eq!(harness.reporter.statuses()[0].2, StatusState::Failure);
}

#[tokio::test]
async fn test_metadata_failure_skips_conversion() {
    let mut harness = Harness::new(
        FakeImages::with_labels(valid_labels()),
        PLAIN_DOCKERFILE,
        Some("samtools --version\n"),
    );
    harness.metadata = Arc::new(FakeMetadata {
        fail: true,
        ..Default::default()
    });

    let summary = harness.pipeline(harness.config()).run(push_request()).await;

    assert!(matches!(
        summary.error,
        Some(PipelineError::MetadataRegistrationFailed(_))
    ));
    assert!(summary.reached(Stage::Push));
    assert!(!summary.reached(Stage::Convert));
    assert!(harness.converter.produced.lock().unwrap().is_empty());
    assert_eq!(harness.prunes(), 1);
}

#[tokio::test]
async fn test_upload_failure_removes_artifact() {
    let mut harness = Harness::new(
        FakeImages::with_labels(valid_labels()),
        PLAIN_DOCKERFILE,
        Some("samtools --version\n"),
    );
    harness.uploader = Arc::new(FakeUploader {
        fail: true,
        ..Default::default()
    });

    let summary = harness.pipeline(harness.config()).run(push_request()).await;

    assert!(matches!(
        summary.error,
        Some(PipelineError::ConversionFailed(_))
    ));
    assert_eq!(harness.converter.produced.lock().unwrap().len(), 1);
    assert_eq!(harness.artifacts_left(), 0);
    assert_eq!(harness.prunes(), 1);

    let statuses = harness.reporter.statuses();
    let (_, subject, state, _) = statuses.last().unwrap();
    assert_eq!(subject, "samtools");
    assert_eq!(*state, StatusState::Failure);
}

#[tokio::test]
async fn test_dry_run_publishes_nothing() {
    let harness = Harness::new(
        FakeImages::with_labels(valid_labels()),
        PLAIN_DOCKERFILE,
        Some("samtools --version\n"),
    );
    let config = Config {
        dry_run: true,
        ..harness.config()
    };

    let summary = harness.pipeline(config).run(push_request()).await;

    assert!(summary.is_success(), "{:?}", summary.error);
    assert!(summary.reached(Stage::Convert));
    assert!(harness.images.pushes.lock().unwrap().is_empty());
    assert_eq!(harness.scanner.scanned.lock().unwrap().len(), 1);
    assert!(harness.metadata.recorded.lock().unwrap().is_empty());
    assert!(harness.uploader.keys.lock().unwrap().is_empty());
    assert_eq!(harness.converter.produced.lock().unwrap().len(), 1);
    assert_eq!(harness.artifacts_left(), 0);
}

#[tokio::test]
async fn test_missing_integrations_are_skipped() {
    let harness = Harness::new(
        FakeImages::with_labels(valid_labels()),
        PLAIN_DOCKERFILE,
        Some("samtools --version\n"),
    );
    let config = Config {
        dockerhub: None,
        registry_url: None,
        ..harness.config()
    };
    let pipeline = BuildPipeline::new(
        Arc::new(config),
        harness.images.clone(),
        harness.reporter.clone(),
        Arc::new(NoAdvisories),
    );

    let summary = pipeline.run(push_request()).await;

    assert!(summary.is_success(), "{:?}", summary.error);
    assert_eq!(summary.stages.last(), Some(&Stage::Done));
    assert!(harness.images.pushes.lock().unwrap().is_empty());
    assert_eq!(harness.images.builds.lock().unwrap().len(), 2);
}

// ============================================================================
// Cleanup guard
// ============================================================================

#[test]
fn test_guard_cleans_up_once() {
    let images = Arc::new(FakeImages::default());
    let guard = CleanupGuard::new(images.clone());
    guard.track("biocontainers/samtools:1.9");
    guard.track("biocontainers/samtools:1.9_cv2");

    assert!(guard.cleanup());
    assert!(!guard.cleanup());
    drop(guard);

    assert_eq!(images.prunes.load(Ordering::SeqCst), 1);
    assert_eq!(images.removed.lock().unwrap().len(), 2);
}

#[test]
fn test_guard_cleans_up_on_drop() {
    let images = Arc::new(FakeImages::default());
    {
        let guard = CleanupGuard::new(images.clone());
        guard.track("biocontainers/samtools:1.9");
    }

    assert_eq!(images.prunes.load(Ordering::SeqCst), 1);
    assert_eq!(
        *images.removed.lock().unwrap(),
        vec!["biocontainers/samtools:1.9".to_string()]
    );
}
