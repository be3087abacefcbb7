//! Webhook event DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::change::{Commit, PushBatch};

/// Header carrying the event name
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// Push event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    #[serde(default)]
    pub head_commit: Option<PushCommit>,
}

/// A commit as listed in a push event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushCommit {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

impl From<PushCommit> for Commit {
    fn from(commit: PushCommit) -> Self {
        Commit {
            id: commit.id,
            timestamp: commit.timestamp,
            added: commit.added,
            modified: commit.modified,
        }
    }
}

impl From<PushEvent> for PushBatch {
    fn from(event: PushEvent) -> Self {
        PushBatch {
            commits: event.commits.into_iter().map(Commit::from).collect(),
        }
    }
}

/// Pull request event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequestRef,
}

impl PullRequestEvent {
    /// Closed pull requests are never built
    pub fn is_buildable(&self) -> bool {
        self.action != "closed"
    }
}

/// Pull request summary embedded in events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    #[serde(default)]
    pub url: String,
    pub head: HeadRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadRef {
    pub sha: String,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
}

/// A webhook delivery, classified by event type
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    /// Endpoint test delivery
    Ping,
    Push(PushEvent),
    PullRequest(PullRequestEvent),
    /// Any other event; carries the event name
    Ignored(String),
}

impl WebhookEvent {
    /// Classifies a delivery from its event header and JSON body
    ///
    /// Falls back to the body shape when the header is missing.
    pub fn parse(event: Option<&str>, body: serde_json::Value) -> Result<Self, serde_json::Error> {
        if event == Some("ping") || body.get("zen").is_some() {
            return Ok(Self::Ping);
        }

        match event {
            Some("push") => Ok(Self::Push(serde_json::from_value(body)?)),
            Some("pull_request") => Ok(Self::PullRequest(serde_json::from_value(body)?)),
            Some(other) => Ok(Self::Ignored(other.to_string())),
            None if body.get("commits").is_some() => Ok(Self::Push(serde_json::from_value(body)?)),
            None if body.get("pull_request").is_some() => {
                Ok(Self::PullRequest(serde_json::from_value(body)?))
            }
            None => Ok(Self::Ignored("unknown".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_event_to_batch() {
        let body = json!({
            "ref": "refs/heads/master",
            "after": "c2",
            "commits": [
                {
                    "id": "c1",
                    "timestamp": "2020-05-05T19:40:15-04:00",
                    "message": "add samtools",
                    "added": ["samtools/1.9/Dockerfile"],
                    "removed": [],
                    "modified": []
                },
                {
                    "id": "c2",
                    "timestamp": "2020-05-05T23:41:00Z",
                    "modified": ["samtools/1.9/test-cmds.txt"]
                }
            ]
        });

        let event = match WebhookEvent::parse(Some("push"), body).unwrap() {
            WebhookEvent::Push(event) => event,
            other => panic!("unexpected event {:?}", other),
        };
        let batch = PushBatch::from(event);

        assert_eq!(batch.commits.len(), 2);
        assert_eq!(batch.head().unwrap().id, "c2");
        assert!(batch.commits[0].timestamp < batch.commits[1].timestamp);
        assert_eq!(
            batch.commits[0].touched_paths().collect::<Vec<_>>(),
            vec!["samtools/1.9/Dockerfile"]
        );
    }

    #[test]
    fn test_pull_request_event_without_header() {
        let body = json!({
            "action": "synchronize",
            "number": 12,
            "pull_request": {
                "number": 12,
                "url": "https://api.github.com/repos/o/r/pulls/12",
                "head": { "sha": "abc", "ref": "feature" }
            }
        });

        match WebhookEvent::parse(None, body).unwrap() {
            WebhookEvent::PullRequest(event) => {
                assert_eq!(event.number, 12);
                assert_eq!(event.pull_request.head.sha, "abc");
                assert!(event.is_buildable());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_ping_and_ignored_events() {
        assert!(matches!(
            WebhookEvent::parse(None, json!({"zen": "Keep it simple"})).unwrap(),
            WebhookEvent::Ping
        ));
        assert!(matches!(
            WebhookEvent::parse(Some("issues"), json!({})).unwrap(),
            WebhookEvent::Ignored(name) if name == "issues"
        ));
    }

    #[test]
    fn test_malformed_push_is_an_error() {
        assert!(WebhookEvent::parse(Some("push"), json!({"commits": [{"id": 1}]})).is_err());
    }
}
