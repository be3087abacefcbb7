//! Pipeline run domain types
//!
//! A pipeline run is the transient state attached to one build request while
//! it moves through the build pipeline. Nothing about a run outlives it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::domain::request::BuildRequest;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Build,
    ValidateLabels,
    Test,
    StopIfPr,
    Tag,
    Push,
    Scan,
    RegisterMetadata,
    Convert,
    Cleanup,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "BUILD",
            Stage::ValidateLabels => "VALIDATE_LABELS",
            Stage::Test => "TEST",
            Stage::StopIfPr => "STOP_IF_PR",
            Stage::Tag => "TAG",
            Stage::Push => "PUSH",
            Stage::Scan => "SCAN",
            Stage::RegisterMetadata => "REGISTER_METADATA",
            Stage::Convert => "CONVERT",
            Stage::Cleanup => "CLEANUP",
            Stage::Done => "DONE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::Failure => f.write_str("failure"),
        }
    }
}

/// State of one build request moving through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub request: BuildRequest,
    pub started_at: DateTime<Utc>,
    stage: Stage,
    visited: Vec<Stage>,
    tag: Option<String>,
    status: Option<RunStatus>,
}

impl PipelineRun {
    pub fn new(request: BuildRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            started_at: Utc::now(),
            stage: Stage::Build,
            visited: vec![Stage::Build],
            tag: None,
            status: None,
        }
    }

    /// Moves the run to `stage`. Stages only ever move forward.
    pub fn enter(&mut self, stage: Stage) {
        debug_assert!(stage >= self.stage, "{} entered after {}", stage, self.stage);
        if stage != self.stage {
            self.stage = stage;
            self.visited.push(stage);
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage the run has entered, in order
    pub fn visited(&self) -> &[Stage] {
        &self.visited
    }

    pub fn reached(&self, stage: Stage) -> bool {
        self.visited.contains(&stage)
    }

    /// Fixes the publish tag. The first tag wins; returns false if one was already set.
    pub fn fix_tag(&mut self, tag: impl Into<String>) -> bool {
        if self.tag.is_some() {
            return false;
        }
        self.tag = Some(tag.into());
        true
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Marks the run as done with its terminal status
    pub fn finish(&mut self, status: RunStatus) {
        self.enter(Stage::Done);
        self.status = Some(status);
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.status
    }
}
