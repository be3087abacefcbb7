//! Error types for dispatching change batches

use thiserror::Error;

/// Errors raised while turning a change batch into build requests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The batch is malformed or ambiguous. Not retryable.
    #[error("dispatch rejected: {reason}")]
    Rejected { reason: String },
}

impl DispatchError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Human-readable reason, as reported to the source-hosting system
    pub fn reason(&self) -> &str {
        match self {
            Self::Rejected { reason } => reason,
        }
    }
}
