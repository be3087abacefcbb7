//! Run context
//!
//! Per-run state shared by the pipeline stages:
//! - The timestamped run log returned with the run summary
//! - The status subject, the effective software name once labels are read

use dockyard_core::domain::log::{LogEntry, LogLevel};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Execution context of one pipeline run
pub struct Context {
    pub run_id: Uuid,

    /// Log buffer with entries
    log_buffer: Mutex<Vec<LogEntry>>,

    subject: Mutex<String>,
}

impl Context {
    /// Creates a context for `run_id`; `subject` starts as the container name
    pub fn new(run_id: Uuid, subject: impl Into<String>) -> Self {
        Self {
            run_id,
            log_buffer: Mutex::new(Vec::new()),
            subject: Mutex::new(subject.into()),
        }
    }

    /// Adds a log entry to the buffer
    pub fn add_log(&self, entry: LogEntry) {
        if let Ok(mut buffer) = self.log_buffer.lock() {
            buffer.push(entry);
        }
    }

    /// Logs a debug message
    pub fn log_debug(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(run = %self.run_id, "{}", message);
        self.add_log(LogEntry::now(LogLevel::Debug, message));
    }

    /// Logs an info message
    pub fn log_info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(run = %self.run_id, "{}", message);
        self.add_log(LogEntry::now(LogLevel::Info, message));
    }

    /// Logs a warning message
    pub fn log_warning(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(run = %self.run_id, "{}", message);
        self.add_log(LogEntry::now(LogLevel::Warning, message));
    }

    /// Logs an error message
    pub fn log_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(run = %self.run_id, "{}", message);
        self.add_log(LogEntry::now(LogLevel::Error, message));
    }

    /// Appends builder output without echoing it to the process log
    pub fn add_build_output(&self, lines: &[String]) {
        for line in lines {
            self.add_log(LogEntry::now(LogLevel::Info, line.clone()));
        }
    }

    /// Name under which statuses are reported
    pub fn subject(&self) -> String {
        self.subject
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn set_subject(&self, subject: impl Into<String>) {
        if let Ok(mut current) = self.subject.lock() {
            *current = subject.into();
        }
    }

    /// Drains all log entries from the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        self.log_buffer
            .lock()
            .map(|mut buffer| buffer.drain(..).collect())
            .unwrap_or_default()
    }
}
