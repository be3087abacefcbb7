//! Dockyard Core
//!
//! Core types and logic for the Dockyard container-recipe CI.
//!
//! This crate contains:
//! - Domain types: Build requests, change batches, label sets, pipeline runs
//! - DTOs: Webhook payloads and source-hosting API bodies
//! - Dispatch: Turning change batches into build requests
//! - Validation: Checking recipe labels and deriving the publish tag
//! - Collaborator traits: Reporter and advisory lookups

pub mod advisory;
pub mod dispatch;
pub mod domain;
pub mod dto;
pub mod error;
pub mod reporter;
pub mod validate;

pub use dispatch::{ChangeExtractor, DispatchConfig};
pub use error::DispatchError;
pub use reporter::Reporter;
pub use validate::{LabelValidator, LabelVerdict};
