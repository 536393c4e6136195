//! Cooperative cancellation for long-running builds.
//!
//! A build checks its [`CancelFlag`] between stages and between files, so an
//! embedding service can stop a build without tearing down the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::IntentError;

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a flag in the "running" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`IntentError::Cancelled`] once cancellation has been requested.
    pub fn check(&self) -> Result<(), IntentError> {
        if self.is_cancelled() {
            Err(IntentError::Cancelled)
        } else {
            Ok(())
        }
    }
}
