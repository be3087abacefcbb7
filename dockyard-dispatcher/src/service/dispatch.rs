//! Dispatch Service
//!
//! Turns webhook deliveries into build requests and triggers one remote build
//! per request. A failed trigger never prevents its siblings.

use dockyard_client::{BuildTrigger, ClientError, GitHubClient};
use dockyard_core::ChangeExtractor;
use dockyard_core::domain::change::{PullRequestFiles, PushBatch};
use dockyard_core::domain::request::BuildRequest;
use dockyard_core::dto::webhook::{PullRequestEvent, WebhookEvent};
use dockyard_core::error::DispatchError;
use serde::Serialize;
use std::sync::Arc;

/// Service error type
#[derive(Debug)]
pub enum HookError {
    /// The change batch was rejected; already reported
    Rejected(String),
    /// The source-hosting API could not be read
    Upstream(String),
}

impl From<DispatchError> for HookError {
    fn from(err: DispatchError) -> Self {
        HookError::Rejected(err.reason().to_string())
    }
}

impl From<ClientError> for HookError {
    fn from(err: ClientError) -> Self {
        HookError::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HookError>;

/// A build request whose trigger failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerFailure {
    pub request: String,
    pub error: String,
    /// True when redelivering the hook may succeed
    pub retryable: bool,
}

/// Requests triggered for one delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub dispatched: Vec<String>,
    pub failed: Vec<TriggerFailure>,
}

/// What the dispatcher did with a delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum HookOutcome {
    Pong,
    Ignored { reason: String },
    Dispatched(DispatchReport),
}

/// Webhook dispatch service
pub struct DispatchService {
    extractor: ChangeExtractor,
    github: GitHubClient,
    trigger: Arc<dyn BuildTrigger>,
}

impl DispatchService {
    pub fn new(extractor: ChangeExtractor, github: GitHubClient, trigger: Arc<dyn BuildTrigger>) -> Self {
        Self {
            extractor,
            github,
            trigger,
        }
    }

    /// Handles one classified delivery
    pub async fn handle(&self, event: WebhookEvent) -> Result<HookOutcome> {
        match event {
            WebhookEvent::Ping => {
                tracing::debug!("Ping delivery acknowledged");
                Ok(HookOutcome::Pong)
            }
            WebhookEvent::Ignored(name) => {
                tracing::debug!("Ignoring {} delivery", name);
                Ok(HookOutcome::Ignored {
                    reason: format!("{} events are not handled", name),
                })
            }
            WebhookEvent::Push(event) => {
                tracing::info!("Push to {} with {} commit(s)", event.git_ref, event.commits.len());
                let batch = PushBatch::from(event);
                let requests = self.extractor.extract_push(&batch).await;
                Ok(HookOutcome::Dispatched(self.trigger_all(requests).await))
            }
            WebhookEvent::PullRequest(event) => self.handle_pull_request(event).await,
        }
    }

    async fn handle_pull_request(&self, event: PullRequestEvent) -> Result<HookOutcome> {
        tracing::info!("Pull request #{} {}", event.number, event.action);

        if !event.is_buildable() {
            return Ok(HookOutcome::Ignored {
                reason: format!("pull request #{} is {}", event.number, event.action),
            });
        }

        let files = self.github.list_pull_request_files(event.number).await?;
        let request = self
            .extractor
            .extract_pull_request(&PullRequestFiles {
                number: event.number,
                head_sha: event.pull_request.head.sha,
                files,
            })
            .await?;

        Ok(HookOutcome::Dispatched(self.trigger_all(vec![request]).await))
    }

    /// Triggers every request independently
    async fn trigger_all(&self, requests: Vec<BuildRequest>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for request in requests {
            match self.trigger.trigger(&request).await {
                Ok(()) => report.dispatched.push(request.to_string()),
                Err(e) => {
                    tracing::error!("Failed to trigger {}: {}", request, e);
                    report.failed.push(TriggerFailure {
                        request: request.to_string(),
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dockyard_client::GitHubReporter;
    use dockyard_core::DispatchConfig;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records triggered requests; fails for one container
    #[derive(Default)]
    struct RecordingTrigger {
        fail_for: Option<&'static str>,
        triggered: Mutex<Vec<BuildRequest>>,
    }

    #[async_trait]
    impl BuildTrigger for RecordingTrigger {
        async fn trigger(&self, request: &BuildRequest) -> dockyard_client::Result<()> {
            if self.fail_for == Some(request.container()) {
                return Err(ClientError::api_error(503, "unavailable"));
            }
            self.triggered.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn service(api_url: &str, trigger: Arc<RecordingTrigger>) -> DispatchService {
        let extractor = ChangeExtractor::new(
            DispatchConfig::default(),
            Arc::new(GitHubReporter::disabled()),
        );
        let github = GitHubClient::new(api_url, "BioContainers/containers", None);
        DispatchService::new(extractor, github, trigger)
    }

    fn push_body() -> serde_json::Value {
        json!({
            "ref": "refs/heads/master",
            "after": "c3",
            "commits": [
                {
                    "id": "c1",
                    "timestamp": "2020-05-05T10:00:00Z",
                    "message": "add samtools",
                    "added": ["samtools/1.9/Dockerfile"]
                },
                {
                    "id": "c2",
                    "timestamp": "2020-05-05T11:00:00Z",
                    "message": "add bwa",
                    "added": ["bwa/0.7.17/Dockerfile"]
                },
                {
                    "id": "c3",
                    "timestamp": "2020-05-05T12:00:00Z",
                    "message": "fix samtools tests",
                    "modified": ["samtools/1.9/test-cmds.txt"]
                }
            ]
        })
    }

    fn pull_request_body(action: &str) -> serde_json::Value {
        json!({
            "action": action,
            "number": 12,
            "pull_request": {
                "number": 12,
                "url": "https://api.github.com/repos/BioContainers/containers/pulls/12",
                "head": { "sha": "def456", "ref": "samtools-1.9" }
            }
        })
    }

    #[tokio::test]
    async fn test_push_triggers_each_container_once() {
        let trigger = Arc::new(RecordingTrigger::default());
        let service = service("http://127.0.0.1:1", trigger.clone());

        let event = WebhookEvent::parse(Some("push"), push_body()).unwrap();
        let outcome = service.handle(event).await.unwrap();

        let HookOutcome::Dispatched(report) = outcome else {
            panic!("expected a dispatch");
        };
        assert_eq!(report.dispatched.len(), 2);
        assert!(report.failed.is_empty());

        let triggered = trigger.triggered.lock().unwrap();
        let samtools = triggered
            .iter()
            .find(|r| r.container() == "samtools")
            .unwrap();
        assert_eq!(samtools.trigger_ref(), "c3");
    }

    #[tokio::test]
    async fn test_failed_trigger_does_not_stop_siblings() {
        let trigger = Arc::new(RecordingTrigger {
            fail_for: Some("bwa"),
            ..Default::default()
        });
        let service = service("http://127.0.0.1:1", trigger.clone());

        let event = WebhookEvent::parse(Some("push"), push_body()).unwrap();
        let HookOutcome::Dispatched(report) = service.handle(event).await.unwrap() else {
            panic!("expected a dispatch");
        };

        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].request.starts_with("bwa/0.7.17"));
        assert!(report.failed[0].retryable);
        assert_eq!(trigger.triggered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ping_and_ignored_events() {
        let service = service("http://127.0.0.1:1", Arc::new(RecordingTrigger::default()));

        let ping = WebhookEvent::parse(None, json!({"zen": "Design for failure."})).unwrap();
        assert_eq!(service.handle(ping).await.unwrap(), HookOutcome::Pong);

        let issues = WebhookEvent::parse(Some("issues"), json!({})).unwrap();
        assert!(matches!(
            service.handle(issues).await.unwrap(),
            HookOutcome::Ignored { .. }
        ));
    }

    #[tokio::test]
    async fn test_pull_request_is_triggered_with_head_sha() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/BioContainers/containers/pulls/12/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"filename": "samtools/1.9/Dockerfile", "status": "added"},
                {"filename": "samtools/1.9/test-cmds.txt", "status": "added"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let trigger = Arc::new(RecordingTrigger::default());
        let service = service(&server.uri(), trigger.clone());

        let event = WebhookEvent::parse(Some("pull_request"), pull_request_body("opened")).unwrap();
        let HookOutcome::Dispatched(report) = service.handle(event).await.unwrap() else {
            panic!("expected a dispatch");
        };
        assert_eq!(report.dispatched.len(), 1);

        let triggered = trigger.triggered.lock().unwrap();
        assert_eq!(triggered[0].pull_request(), Some(12));
        assert_eq!(triggered[0].trigger_ref(), "def456");
    }

    #[tokio::test]
    async fn test_pull_request_with_two_containers_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/BioContainers/containers/pulls/12/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"filename": "samtools/1.9/Dockerfile", "status": "added"},
                {"filename": "bwa/0.7.17/Dockerfile", "status": "modified"}
            ])))
            .mount(&server)
            .await;

        let trigger = Arc::new(RecordingTrigger::default());
        let service = service(&server.uri(), trigger.clone());

        let event = WebhookEvent::parse(Some("pull_request"), pull_request_body("synchronize")).unwrap();
        let err = service.handle(event).await.unwrap_err();

        assert!(matches!(
            err,
            HookError::Rejected(ref reason) if reason == "can't modify multiple containers in a same pull request"
        ));
        assert!(trigger.triggered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_pull_request_is_ignored() {
        let trigger = Arc::new(RecordingTrigger::default());
        let service = service("http://127.0.0.1:1", trigger.clone());

        let event = WebhookEvent::parse(Some("pull_request"), pull_request_body("closed")).unwrap();
        assert!(matches!(
            service.handle(event).await.unwrap(),
            HookOutcome::Ignored { .. }
        ));
        assert!(trigger.triggered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_pull_request_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = service(&server.uri(), Arc::new(RecordingTrigger::default()));
        let event = WebhookEvent::parse(Some("pull_request"), pull_request_body("opened")).unwrap();

        assert!(matches!(
            service.handle(event).await.unwrap_err(),
            HookError::Upstream(_)
        ));
    }
}
