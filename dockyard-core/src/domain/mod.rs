//! Core domain types
//!
//! This module contains the core domain structures used across Dockyard services.
//! They are shared between the dispatcher (which turns change events into build
//! requests) and the runner (which carries a build request through the pipeline).

pub mod change;
pub mod labels;
pub mod log;
pub mod request;
pub mod run;
pub mod status;
