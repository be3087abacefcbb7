//! Service Module
//!
//! Business logic layer for the dispatcher.
//! Services turn webhook deliveries into remote build triggers.

pub mod dispatch;

// Re-export for convenience
pub use dispatch as dispatch_service;
