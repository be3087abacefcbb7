//! Cleanup guard
//!
//! Owns the local image tags of one run. Cleanup runs exactly once: either
//! explicitly at the end of the run or when the guard is dropped.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::podman::ImageStore;

pub struct CleanupGuard {
    images: Arc<dyn ImageStore>,
    tags: Mutex<Vec<String>>,
    done: AtomicBool,
}

impl CleanupGuard {
    pub fn new(images: Arc<dyn ImageStore>) -> Self {
        Self {
            images,
            tags: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
        }
    }

    /// Registers a local tag to remove at cleanup
    pub fn track(&self, tag: impl Into<String>) {
        if let Ok(mut tags) = self.tags.lock() {
            tags.push(tag.into());
        }
    }

    /// Removes every tracked tag, then prunes
    ///
    /// Each removal is attempted independently and failures are only logged.
    ///
    /// # Returns
    /// False if cleanup had already run
    pub fn cleanup(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }

        let tags = self
            .tags
            .lock()
            .map(|mut tags| std::mem::take(&mut *tags))
            .unwrap_or_default();

        for tag in &tags {
            match self.images.remove(tag) {
                Ok(()) => debug!("Removed {}", tag),
                Err(e) => warn!("Failed to remove {}: {}", tag, e),
            }
        }
        self.images.prune();
        true
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.cleanup() {
            warn!("Run ended without explicit cleanup, cleaned up on drop");
        }
    }
}
