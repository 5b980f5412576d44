//! Cooperative cancellation signal handed to every collaborator call.
//!
//! The orchestrator never polls it; collaborators check it and fail
//! with `SubmitError::Cancelled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::{SubmitError, SubmitResult};

/// Cloneable cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; visible to every clone
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with `Cancelled` once cancellation was requested
    pub fn check(&self) -> SubmitResult<()> {
        if self.is_cancelled() {
            Err(SubmitError::Cancelled)
        } else {
            Ok(())
        }
    }
}
