//! Session arena.
//!
//! [`SessionManager`] owns every live session's [`FrameAssembler`] and is
//! the only place sessions are created or torn down. Teardown is always a
//! final flush followed by clearing the session's expectations, so no
//! debounce timer or expectation timer outlives its session.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │              SessionManager               │
//! │  ┌─────────────────────────────────────┐  │
//! │  │ SessionId=1 → FrameAssembler        │  │
//! │  │ SessionId=2 → FrameAssembler        │  │
//! │  └─────────────────────────────────────┘  │
//! │   frames ──► FrameObserver                │
//! │          └─► ValidationRegistry           │
//! └───────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::command::CommandExecutor;
use crate::error::{Error, Result};
use crate::framing::{Frame, FrameAssembler, FrameSink, FramingConfig};
use crate::identifiers::SessionId;
use crate::options::CoreOptions;
use crate::script::{ScriptEngine, ScriptSandbox};
use crate::sequence::{CommandStore, SequenceRunner};
use crate::transport::Transport;
use crate::validation::ValidationRegistry;

use super::builder::SessionManagerBuilder;
use super::sinks::{Direction, FrameRecord, Sinks};

// ============================================================================
// Types
// ============================================================================

/// Live assemblers keyed by session.
pub(crate) type SessionArena = Arc<RwLock<FxHashMap<SessionId, FrameAssembler>>>;

// ============================================================================
// SessionManager
// ============================================================================

/// Owner of all live sessions.
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct SessionManager {
    sessions: SessionArena,
    registry: ValidationRegistry,
    executor: CommandExecutor,
    runner: SequenceRunner,
    scripts: Arc<dyn ScriptEngine>,
    sandbox: ScriptSandbox,
    sinks: Sinks,
    options: CoreOptions,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.read().len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionManager - Constructor
// ============================================================================

impl SessionManager {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// Wires the subsystems together. Called by the builder.
    pub(crate) fn new(
        options: CoreOptions,
        transport: Arc<dyn Transport>,
        scripts: Arc<dyn ScriptEngine>,
        sinks: Sinks,
        commands: Arc<dyn CommandStore>,
    ) -> Self {
        let sessions: SessionArena = Arc::new(RwLock::new(FxHashMap::default()));
        let sandbox = ScriptSandbox::new(options.script_time_limit);
        let registry = ValidationRegistry::new(Arc::clone(&scripts), sinks.clone(), &options);
        let executor = CommandExecutor::new(
            Arc::clone(&sessions),
            registry.clone(),
            transport,
            Arc::clone(&scripts),
            sandbox,
            sinks.clone(),
        );
        let runner = SequenceRunner::new(executor.clone(), commands, options.post_send_delay);

        Self {
            sessions,
            registry,
            executor,
            runner,
            scripts,
            sandbox,
            sinks,
            options,
        }
    }
}

// ============================================================================
// SessionManager - Lifecycle
// ============================================================================

impl SessionManager {
    /// Opens a session with the given framing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the session is already open.
    pub fn open(&self, session_id: SessionId, framing: FramingConfig) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session_id) {
            return Err(Error::config(format!("session {session_id} is already open")));
        }

        let assembler = FrameAssembler::new(
            session_id,
            framing,
            self.frame_sink(),
            Arc::clone(&self.scripts),
            self.sandbox,
        );
        sessions.insert(session_id, assembler);
        self.registry.open(session_id);

        info!(session_id = %session_id, sessions = sessions.len(), "Session opened");
        Ok(())
    }

    /// Opens a session under a fresh ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the generated ID is somehow in use.
    pub fn open_new(&self, framing: FramingConfig) -> Result<SessionId> {
        let session_id = SessionId::next();
        self.open(session_id, framing)?;
        Ok(session_id)
    }

    /// Tears a session down: final flush, then every pending expectation is
    /// cancelled. Returns the number of expectations cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session is not open.
    pub fn close(&self, session_id: SessionId) -> Result<usize> {
        let assembler = self
            .sessions
            .write()
            .remove(&session_id)
            .ok_or_else(|| Error::session_not_found(session_id))?;

        assembler.close();
        let cancelled = self.registry.clear(session_id);

        info!(session_id = %session_id, cancelled, "Session closed");
        Ok(cancelled)
    }

    /// Closes every session.
    pub fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.read().keys().copied().collect();
        for session_id in ids {
            if let Err(e) = self.close(session_id) {
                warn!(session_id = %session_id, error = %e, "Close during shutdown failed");
            }
        }
        debug!("Session manager shut down");
    }

    /// Returns `true` if the session is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self, session_id: SessionId) -> bool {
        self.sessions.read().contains_key(&session_id)
    }

    /// Returns the number of open sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns the IDs of all open sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }
}

// ============================================================================
// SessionManager - Inbound Data & Framing
// ============================================================================

impl SessionManager {
    /// Feeds inbound bytes into the session's assembler.
    ///
    /// Frames completed by this chunk are observed and queued for
    /// validation before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session is not open.
    pub fn ingest(&self, session_id: SessionId, bytes: &[u8], timestamp_ms: u64) -> Result<()> {
        self.assembler(session_id)?.push(bytes, timestamp_ms);
        Ok(())
    }

    /// Replaces the session-wide framing. Buffered bytes are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session is not open.
    pub fn set_framing(&self, session_id: SessionId, framing: FramingConfig) -> Result<()> {
        self.assembler(session_id)?.set_config(framing);
        Ok(())
    }

    /// Returns the session-wide framing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session is not open.
    pub fn framing(&self, session_id: SessionId) -> Result<FramingConfig> {
        Ok(self.assembler(session_id)?.config())
    }

    /// Returns the framing in effect, including a per-command override.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session is not open.
    pub fn active_framing(&self, session_id: SessionId) -> Result<FramingConfig> {
        Ok(self.assembler(session_id)?.active_config())
    }

    /// Emits whatever the session has buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session is not open.
    pub fn flush(&self, session_id: SessionId) -> Result<()> {
        self.assembler(session_id)?.flush();
        Ok(())
    }

    /// Returns the number of buffered, not-yet-framed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session is not open.
    pub fn buffered_len(&self, session_id: SessionId) -> Result<usize> {
        Ok(self.assembler(session_id)?.buffered_len())
    }
}

// ============================================================================
// SessionManager - Accessors
// ============================================================================

impl SessionManager {
    /// Command executor bound to this manager's sessions.
    #[inline]
    #[must_use]
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Sequence runner bound to this manager's sessions.
    #[inline]
    #[must_use]
    pub fn sequence_runner(&self) -> &SequenceRunner {
        &self.runner
    }

    /// Validation registry shared by all sessions.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ValidationRegistry {
        &self.registry
    }

    /// Options this manager was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &CoreOptions {
        &self.options
    }
}

// ============================================================================
// SessionManager - Internal
// ============================================================================

impl SessionManager {
    /// Looks up a session's assembler.
    fn assembler(&self, session_id: SessionId) -> Result<FrameAssembler> {
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Routes emitted frames to the observer and the registry.
    fn frame_sink(&self) -> FrameSink {
        let registry = self.registry.clone();
        let observer = Arc::clone(&self.sinks.frames);

        Arc::new(move |session_id: SessionId, frames: Vec<Frame>| {
            for frame in frames {
                registry.check(&frame, session_id);
                observer.on_frame(&FrameRecord {
                    session_id,
                    direction: Direction::Rx,
                    frame,
                });
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::session::sinks::FrameObserver;
    use crate::transport::RecordingTransport;
    use crate::validation::ValidationConfig;

    #[derive(Default)]
    struct Frames(Mutex<Vec<FrameRecord>>);

    impl FrameObserver for Frames {
        fn on_frame(&self, record: &FrameRecord) {
            self.0.lock().push(record.clone());
        }
    }

    fn manager_with(frames: Arc<Frames>) -> SessionManager {
        SessionManager::builder()
            .transport(Arc::new(RecordingTransport::new()))
            .sinks(Sinks::default().with_frames(frames))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_twice_fails() {
        let manager = manager_with(Arc::default());
        let sid = manager.open_new(FramingConfig::none()).unwrap();
        assert!(manager.open(sid, FramingConfig::none()).is_err());
        assert_eq!(manager.session_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let manager = manager_with(Arc::default());
        let sid = SessionId::next();
        assert!(matches!(
            manager.ingest(sid, b"x", 0),
            Err(Error::SessionNotFound { .. })
        ));
        assert!(manager.flush(sid).is_err());
        assert!(manager.close(sid).is_err());
    }

    #[tokio::test]
    async fn test_ingest_reaches_observer() {
        let frames = Arc::new(Frames::default());
        let manager = manager_with(frames.clone());
        let sid = manager.open_new(FramingConfig::delimiter(",")).unwrap();

        manager.ingest(sid, b"A,B", 10).unwrap();
        assert_eq!(manager.buffered_len(sid).unwrap(), 1);
        manager.flush(sid).unwrap();

        let records = frames.0.lock();
        let bytes: Vec<_> = records.iter().map(|r| r.frame.bytes.clone()).collect();
        assert_eq!(bytes, vec![b"A,".to_vec(), b"B".to_vec()]);
        assert!(records.iter().all(|r| r.direction == Direction::Rx && r.session_id == sid));
    }

    #[tokio::test]
    async fn test_set_framing_keeps_buffer() {
        let frames = Arc::new(Frames::default());
        let manager = manager_with(frames.clone());
        let sid = manager.open_new(FramingConfig::delimiter("\\n")).unwrap();

        manager.ingest(sid, b"AB;C", 0).unwrap();
        manager.set_framing(sid, FramingConfig::delimiter(";")).unwrap();
        manager.ingest(sid, b"D;", 1).unwrap();

        let bytes: Vec<_> = frames.0.lock().iter().map(|r| r.frame.bytes.clone()).collect();
        assert_eq!(bytes, vec![b"AB;".to_vec(), b"CD;".to_vec()]);
        assert_eq!(manager.framing(sid).unwrap(), FramingConfig::delimiter(";"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_tears_down_timers() {
        let frames = Arc::new(Frames::default());
        let manager = manager_with(frames.clone());
        let sid = manager.open_new(FramingConfig::timeout(50)).unwrap();

        let pending = manager
            .registry()
            .register(sid, &ValidationConfig::contains("never").with_timeout(100), "x")
            .unwrap();
        manager.ingest(sid, b"partial", 0).unwrap();

        assert_eq!(manager.close(sid).unwrap(), 1);
        assert!(!manager.is_open(sid));
        assert!(matches!(pending.wait().await, Err(Error::ValidationCancelled { .. })));

        // Final flush emitted the buffer; the debounce timer must not fire again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(frames.0.lock().len(), 1);
        assert_eq!(manager.registry().pending_count(sid), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all() {
        let manager = manager_with(Arc::default());
        for _ in 0..3 {
            manager.open_new(FramingConfig::none()).unwrap();
        }
        manager.shutdown();
        assert_eq!(manager.session_count(), 0);
    }
}
