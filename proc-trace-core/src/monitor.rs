//! Cooperative cancellation for long running queries

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token shared between a caller and a running computation
///
/// Clones observe the same flag. Computations check it between attribute
/// groups and stop early, keeping whatever they already merged.
#[derive(Debug, Clone, Default)]
pub struct ProgressMonitor {
    cancelled: Arc<AtomicBool>,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
