//! In-memory transport.
//!
//! Records every write and optionally hands it to a hook, which can answer
//! by feeding bytes back through the session manager. Writes can be made to
//! fail to exercise error paths.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::Transport;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked after every successful write.
pub type WriteHook = Arc<dyn Fn(SessionId, &[u8]) + Send + Sync>;

// ============================================================================
// RecordingTransport
// ============================================================================

/// Transport that keeps written bytes in memory.
#[derive(Default)]
pub struct RecordingTransport {
    writes: Mutex<Vec<(SessionId, Vec<u8>)>>,
    failures: Mutex<VecDeque<String>>,
    hook: Mutex<Option<WriteHook>>,
}

impl fmt::Debug for RecordingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingTransport")
            .field("writes", &self.writes.lock().len())
            .field("queued_failures", &self.failures.lock().len())
            .finish_non_exhaustive()
    }
}

impl RecordingTransport {
    /// Creates an empty transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the write hook.
    pub fn set_hook(&self, hook: WriteHook) {
        *self.hook.lock() = Some(hook);
    }

    /// Makes the next write fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.failures.lock().push_back(message.into());
    }

    /// Returns every successful write, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(SessionId, Vec<u8>)> {
        self.writes.lock().clone()
    }

    /// Returns the successful writes of one session.
    #[must_use]
    pub fn writes_for(&self, session_id: SessionId) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn write(&self, session_id: SessionId, bytes: &[u8]) -> Result<()> {
        if let Some(message) = self.failures.lock().pop_front() {
            return Err(Error::transport(session_id, message));
        }

        trace!(session_id = %session_id, len = bytes.len(), "Recorded write");
        self.writes.lock().push((session_id, bytes.to_vec()));

        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(session_id, bytes);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_records_and_fails_on_demand() {
        let transport = RecordingTransport::new();
        let sid = SessionId::next();

        transport.fail_next("port closed");
        let err = transport.write(sid, b"AT\r\n").await.unwrap_err();
        assert!(err.is_transport_error());

        transport.write(sid, b"AT\r\n").await.unwrap();
        assert_eq!(transport.writes_for(sid), vec![b"AT\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_hook_sees_writes() {
        let transport = RecordingTransport::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        transport.set_hook(Arc::new(move |_: SessionId, bytes: &[u8]| {
            counter.fetch_add(bytes.len(), Ordering::SeqCst);
        }));

        transport.write(SessionId::next(), b"PING").await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}
