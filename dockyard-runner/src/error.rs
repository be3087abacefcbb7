//! Pipeline error taxonomy

use dockyard_core::domain::run::Stage;
use thiserror::Error;

/// Fatal errors of a single pipeline run
///
/// Each variant aborts the remaining stages of its own run only. Cleanup still
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("failed to build: {0}")]
    BuildFailed(String),

    #[error("label validation failed: {0}")]
    LabelValidationFailed(String),

    #[error("tests failed: {0}")]
    TestFailed(String),

    /// Tagging or pushing the public image failed
    #[error("failed to publish: {0}")]
    PublishFailed(String),

    /// The image is published but recording its metadata upstream failed
    #[error("metadata registration failed: {0}")]
    MetadataRegistrationFailed(String),

    /// Converting or uploading the single-file artifact failed
    #[error("conversion failed: {0}")]
    ConversionFailed(String),
}

impl PipelineError {
    /// Stage that raises this error
    pub fn stage(&self) -> Stage {
        match self {
            Self::BuildFailed(_) => Stage::Build,
            Self::LabelValidationFailed(_) => Stage::ValidateLabels,
            Self::TestFailed(_) => Stage::Test,
            Self::PublishFailed(_) => Stage::Push,
            Self::MetadataRegistrationFailed(_) => Stage::RegisterMetadata,
            Self::ConversionFailed(_) => Stage::Convert,
        }
    }

    /// True when the failure was already reported as a status by its stage
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::LabelValidationFailed(_) | Self::TestFailed(_))
    }
}
