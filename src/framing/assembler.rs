//! Per-session frame assembler.
//!
//! Reassembles an arbitrarily chunked byte stream into frames under the
//! session's [`FramingConfig`] and hands every emitted batch to a
//! [`FrameSink`].
//!
//! # Lifecycle
//!
//! 1. `FrameAssembler::new` - created when the session opens
//! 2. `push` - every inbound chunk
//! 3. `set_config` / `set_override` - framing changes, buffer retained
//! 4. `close` - final forced flush, debounce timer cancelled
//!
//! # Guarantees
//!
//! - Buffered bytes survive strategy switches and script failures.
//! - Emitted frame bytes plus the remainder equal the pushed bytes
//!   (length headers excepted, which are consumed).
//! - The debounce timer is owned by the assembler and aborted on every
//!   push, config change, flush and close.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::identifiers::SessionId;
use crate::script::{ScriptEngine, ScriptSandbox};

use super::buffer::ChunkBuffer;
use super::config::FramingConfig;
use super::strategy::{ScriptedFramer, Strategy};
use super::types::{Frame, TimedChunk};

// ============================================================================
// Types
// ============================================================================

/// Frame emission callback. Receives every batch emitted by one assembler.
pub type FrameSink = Arc<dyn Fn(SessionId, Vec<Frame>) + Send + Sync>;

/// Identifies one installed framing override.
///
/// Only the holder of the currently installed token can expire it; a newer
/// override supersedes older tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverrideToken(u64);

// ============================================================================
// AssemblerState
// ============================================================================

/// Mutable state of one assembler.
struct AssemblerState {
    /// Not-yet-framed bytes.
    buffer: ChunkBuffer,
    /// Session-wide framing.
    base: FramingConfig,
    /// Temporary per-command framing, if installed.
    override_config: Option<FramingConfig>,
    /// Owner of the installed override.
    override_owner: Option<OverrideToken>,
    /// Source of override tokens.
    next_override: u64,
    /// Strategy resolved from the active config.
    strategy: Strategy,
    /// Live debounce timer for the timeout strategy.
    debounce: Option<JoinHandle<()>>,
    /// Bumped whenever the debounce timer is invalidated.
    generation: u64,
    /// Set once the session is torn down.
    closed: bool,
}

impl AssemblerState {
    /// Config currently in effect.
    fn active_config(&self) -> &FramingConfig {
        self.override_config.as_ref().unwrap_or(&self.base)
    }

    /// Aborts the debounce timer, if any.
    fn cancel_debounce(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
    }
}

// ============================================================================
// FrameAssembler
// ============================================================================

/// Turns a session's raw byte stream into frames.
///
/// Cheap to share: all state lives behind an `Arc`.
#[derive(Clone)]
pub struct FrameAssembler {
    /// Owning session.
    session_id: SessionId,
    /// Shared state (also held by the debounce timer).
    state: Arc<Mutex<AssemblerState>>,
    /// Emission callback.
    sink: FrameSink,
    /// Resolves framing scripts.
    scripts: Arc<dyn ScriptEngine>,
    /// Runs framing scripts under a time limit.
    sandbox: ScriptSandbox,
}

impl fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FrameAssembler")
            .field("session_id", &self.session_id)
            .field("buffered", &state.buffer.len())
            .field("strategy", &state.strategy)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// FrameAssembler - Constructor
// ============================================================================

impl FrameAssembler {
    /// Creates an assembler for one session.
    pub fn new(
        session_id: SessionId,
        config: FramingConfig,
        sink: FrameSink,
        scripts: Arc<dyn ScriptEngine>,
        sandbox: ScriptSandbox,
    ) -> Self {
        let strategy = Strategy::resolve(&config, scripts.as_ref());

        debug!(session_id = %session_id, strategy = ?config.strategy, "Assembler created");

        Self {
            session_id,
            state: Arc::new(Mutex::new(AssemblerState {
                buffer: ChunkBuffer::new(),
                base: config,
                override_config: None,
                override_owner: None,
                next_override: 0,
                strategy,
                debounce: None,
                generation: 0,
                closed: false,
            })),
            sink,
            scripts,
            sandbox,
        }
    }
}

// ============================================================================
// FrameAssembler - Public API
// ============================================================================

impl FrameAssembler {
    /// Returns the owning session.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Appends a chunk and emits whatever frames it completes.
    pub fn push(&self, bytes: &[u8], timestamp_ms: u64) {
        let frames = {
            let mut state = self.state.lock();
            if state.closed {
                warn!(session_id = %self.session_id, len = bytes.len(), "Push after close ignored");
                return;
            }

            state.buffer.push(bytes, timestamp_ms);
            trace!(
                session_id = %self.session_id,
                len = bytes.len(),
                buffered = state.buffer.len(),
                "Chunk buffered"
            );

            self.apply_strategy(&mut state, false)
        };

        self.emit(frames);
    }

    /// Replaces the session-wide framing.
    ///
    /// Buffered bytes are kept and reinterpreted on the next push or flush.
    /// While a per-command override is installed the new config takes effect
    /// once the override expires.
    pub fn set_config(&self, config: FramingConfig) {
        let mut state = self.state.lock();
        state.cancel_debounce();
        state.base = config;

        if state.override_config.is_none() {
            state.strategy = Strategy::resolve(&state.base, self.scripts.as_ref());
        }

        debug!(
            session_id = %self.session_id,
            strategy = ?state.base.strategy,
            buffered = state.buffer.len(),
            "Framing config replaced"
        );
    }

    /// Returns the session-wide framing.
    #[must_use]
    pub fn config(&self) -> FramingConfig {
        self.state.lock().base.clone()
    }

    /// Returns the framing currently in effect (override or session-wide).
    #[must_use]
    pub fn active_config(&self) -> FramingConfig {
        self.state.lock().active_config().clone()
    }

    /// Installs a temporary per-command framing, replacing any earlier one.
    ///
    /// Returns the token that expires it.
    pub fn set_override(&self, config: FramingConfig) -> OverrideToken {
        let mut state = self.state.lock();
        state.cancel_debounce();
        state.strategy = Strategy::resolve(&config, self.scripts.as_ref());
        state.override_config = Some(config);

        state.next_override = state.next_override.wrapping_add(1);
        let token = OverrideToken(state.next_override);
        if let Some(previous) = state.override_owner.replace(token) {
            debug!(session_id = %self.session_id, superseded = previous.0, "Framing override replaced");
        }

        debug!(session_id = %self.session_id, token = token.0, "Framing override installed");
        token
    }

    /// Expires the per-command framing: flushes, then restores the
    /// session-wide framing.
    ///
    /// Does nothing and returns `false` unless `token` owns the installed
    /// override.
    pub fn clear_override(&self, token: OverrideToken) -> bool {
        let frames = {
            let mut state = self.state.lock();
            if state.override_owner != Some(token) {
                trace!(session_id = %self.session_id, token = token.0, "Stale override token ignored");
                return false;
            }

            let frames = self.flush_locked(&mut state);
            state.override_config = None;
            state.override_owner = None;
            state.strategy = Strategy::resolve(&state.base, self.scripts.as_ref());

            debug!(session_id = %self.session_id, "Framing override expired");
            frames
        };

        self.emit(frames);
        true
    }

    /// Emits everything currently buffered.
    ///
    /// Complete frames are cut first; any remainder becomes a final frame.
    pub fn flush(&self) {
        let frames = {
            let mut state = self.state.lock();
            self.flush_locked(&mut state)
        };

        self.emit(frames);
    }

    /// Final flush for session teardown. Later pushes are ignored.
    pub fn close(&self) {
        let frames = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let frames = self.flush_locked(&mut state);
            state.closed = true;
            frames
        };

        debug!(session_id = %self.session_id, "Assembler closed");
        self.emit(frames);
    }

    /// Returns the number of buffered, not-yet-framed bytes.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Returns the buffered chunks.
    #[must_use]
    pub fn buffered_chunks(&self) -> Vec<TimedChunk> {
        self.state.lock().buffer.chunks()
    }

    /// Returns `true` if a debounce timer is pending.
    #[must_use]
    pub fn has_pending_timer(&self) -> bool {
        self.state.lock().debounce.is_some()
    }
}

// ============================================================================
// FrameAssembler - Strategy Dispatch
// ============================================================================

impl FrameAssembler {
    /// Runs the active strategy over the buffer.
    fn apply_strategy(&self, state: &mut AssemblerState, force_flush: bool) -> Vec<Frame> {
        match state.strategy.clone() {
            Strategy::Fixed(framer) => {
                if let Some(quiet) = state.strategy.quiet_period() {
                    if !force_flush {
                        self.restart_debounce(state, quiet);
                        return Vec::new();
                    }
                }

                let drained = framer.drain(&mut state.buffer);
                if drained.reset {
                    warn!(
                        session_id = %self.session_id,
                        "Frame construction failed, buffer flushed and reset"
                    );
                }
                drained.frames
            }

            Strategy::Scripted(framer) => self.run_script(state, &framer, force_flush),
        }
    }

    /// Flushes under the lock: strategy first, then the remainder.
    fn flush_locked(&self, state: &mut AssemblerState) -> Vec<Frame> {
        state.cancel_debounce();

        let mut frames = self.apply_strategy(state, true);
        if let Some(rest) = state.buffer.take_all() {
            frames.push(rest);
        }

        if !frames.is_empty() {
            debug!(session_id = %self.session_id, count = frames.len(), "Flushed");
        }
        frames
    }

    /// Runs the framing script. Failures leave the buffer untouched.
    fn run_script(
        &self,
        state: &mut AssemblerState,
        framer: &ScriptedFramer,
        force_flush: bool,
    ) -> Vec<Frame> {
        let Some(script) = framer.script.clone() else {
            return Vec::new();
        };
        if state.buffer.is_empty() {
            return Vec::new();
        }

        let chunks = state.buffer.chunks();
        let buffered = state.buffer.len();

        let output = match self
            .sandbox
            .run_blocking(&framer.name, move || script.frame(&chunks, force_flush))
        {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    error = %e,
                    buffered,
                    "Framing script failed, buffer kept"
                );
                return Vec::new();
            }
        };

        let produced: usize = output
            .frames
            .iter()
            .chain(output.remaining.iter())
            .map(TimedChunk::len)
            .sum();
        if produced > buffered {
            warn!(
                session_id = %self.session_id,
                script = %framer.name,
                produced,
                buffered,
                "Framing script returned more bytes than buffered, output rejected"
            );
            return Vec::new();
        }

        let reproduces = output
            .frames
            .iter()
            .chain(output.remaining.iter())
            .flat_map(|chunk| chunk.bytes.iter())
            .eq(state.buffer.as_slice().iter());
        if !reproduces {
            if produced == buffered {
                warn!(
                    session_id = %self.session_id,
                    script = %framer.name,
                    buffered,
                    "Framing script output reorders or alters buffered bytes"
                );
            } else {
                debug!(
                    session_id = %self.session_id,
                    script = %framer.name,
                    dropped = buffered - produced,
                    "Framing script dropped buffered bytes"
                );
            }
        }

        state.buffer.replace(output.remaining);

        output
            .frames
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .map(Frame::from)
            .collect()
    }

    /// Restarts the single debounce timer.
    fn restart_debounce(&self, state: &mut AssemblerState, quiet: std::time::Duration) {
        state.cancel_debounce();

        let Ok(runtime) = Handle::try_current() else {
            warn!(
                session_id = %self.session_id,
                "No async runtime, timeout framing waits for flush"
            );
            return;
        };

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let session_id = self.session_id;

        state.debounce = Some(runtime.spawn(async move {
            tokio::time::sleep(quiet).await;

            let frame = {
                let mut state = shared.lock();
                if state.generation != generation || state.closed {
                    return;
                }
                state.debounce = None;
                state.buffer.take_all()
            };

            if let Some(frame) = frame {
                trace!(session_id = %session_id, len = frame.len(), "Quiet period elapsed");
                sink(session_id, vec![frame]);
            }
        }));
    }

    /// Hands frames to the sink.
    fn emit(&self, frames: Vec<Frame>) {
        if frames.is_empty() {
            return;
        }
        trace!(session_id = %self.session_id, count = frames.len(), "Frames emitted");
        (self.sink)(self.session_id, frames);
    }
}

// ============================================================================
// Tests
// ============================================================================
