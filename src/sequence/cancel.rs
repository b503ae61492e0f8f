//! Cooperative cancellation for running sequences.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::{Error, Result};

// ============================================================================
// CancelToken
// ============================================================================

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Signals a running sequence to stop scheduling steps.
///
/// Clones share state. Cancelling never interrupts a write already issued.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Creates an untriggered token.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers cancellation.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Returns `true` once cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`Error::Cancelled`] once cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] naming `operation`.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::cancelled(operation));
        }
        Ok(())
    }

    /// Resolves once cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
