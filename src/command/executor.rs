//! Command execution.
//!
//! # Send Order
//!
//! 1. Substitute placeholders
//! 2. Run the pre-send script, if any
//! 3. Install the framing override, if any
//! 4. Register the expectation
//! 5. Write to the transport
//!
//! The expectation exists before the first byte leaves, so a reply can
//! never arrive ahead of it. If the write fails the expectation is cancelled
//! and the override expires immediately.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::framing::{Frame, FrameAssembler, OverrideToken, unix_millis};
use crate::identifiers::SessionId;
use crate::script::{Params, PreSendScript, ScriptEngine, ScriptSandbox};
use crate::session::manager::SessionArena;
use crate::session::sinks::{Direction, FrameRecord, Level, Sinks};
use crate::transport::Transport;
use crate::validation::{PendingValidation, ValidationOutcome, ValidationRegistry};

use super::payload::{encode, pre_send_bytes, resolve_params, substitute};
use super::types::{Command, LineEnding, PayloadFormat};

/// Log source used for executor entries.
const LOG_SOURCE: &str = "executor";

// ============================================================================
// SendReceipt
// ============================================================================

/// How the reply to a sent command is awaited.
#[derive(Debug)]
enum Reply {
    /// No validation requested.
    None,
    /// Expectation registered directly.
    Pending(PendingValidation),
    /// Expectation whose settlement also expires a framing override.
    Restoring {
        rx: oneshot::Receiver<Result<ValidationOutcome>>,
    },
}

/// Result of a successful write.
#[derive(Debug)]
pub struct SendReceipt {
    /// Bytes handed to the transport.
    pub bytes: Vec<u8>,
    reply: Reply,
}

impl SendReceipt {
    /// Returns `true` if the command registered an expectation.
    #[inline]
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        !matches!(self.reply, Reply::None)
    }

    /// Waits for the reply, if one was requested.
    ///
    /// # Errors
    ///
    /// - [`Error::ValidationTimeout`] if no matching reply arrived in time
    /// - [`Error::ValidationCancelled`] if the session was closed meanwhile
    /// - [`Error::ChannelClosed`] if the runtime shut down before the reply
    pub async fn wait(self) -> Result<Option<ValidationOutcome>> {
        match self.reply {
            Reply::None => Ok(None),
            Reply::Pending(pending) => pending.wait().await.map(Some),
            Reply::Restoring { rx } => rx.await?.map(Some),
        }
    }
}

// ============================================================================
// CommandExecutor
// ============================================================================

/// Builds payloads, registers expectations and writes to the transport.
#[derive(Clone)]
pub struct CommandExecutor {
    sessions: SessionArena,
    registry: ValidationRegistry,
    transport: Arc<dyn Transport>,
    scripts: Arc<dyn ScriptEngine>,
    sandbox: ScriptSandbox,
    sinks: Sinks,
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("sessions", &self.sessions.read().len())
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Creates an executor over a session arena.
    pub(crate) fn new(
        sessions: SessionArena,
        registry: ValidationRegistry,
        transport: Arc<dyn Transport>,
        scripts: Arc<dyn ScriptEngine>,
        sandbox: ScriptSandbox,
        sinks: Sinks,
    ) -> Self {
        Self {
            sessions,
            registry,
            transport,
            scripts,
            sandbox,
            sinks,
        }
    }

    /// Sends a payload, optionally on behalf of a saved command.
    ///
    /// Without a command the payload is written as plain text with no line
    /// ending and no reply is awaited.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if the session is not open
    /// - [`Error::Script`] if the pre-send script fails
    /// - [`Error::Config`] if the payload cannot be encoded
    /// - [`Error::TooManyPending`] if the expectation cannot be registered
    /// - [`Error::Transport`] if the write fails
    pub async fn send(
        &self,
        session_id: SessionId,
        payload: &str,
        command: Option<&Command>,
        params: &Params,
    ) -> Result<SendReceipt> {
        self.assembler(session_id)?;
        let name = command.map_or(payload, |c| c.name.as_str());

        let bytes = match self.build_bytes(payload, command, params).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.report_failure(session_id, name, &e);
                return Err(e);
            }
        };

        // The pre-send script may have yielded while the session was closed.
        let assembler = match self.assembler(session_id) {
            Ok(assembler) => assembler,
            Err(e) => {
                debug!(session_id = %session_id, command = name, "Session closed before write");
                return Err(e);
            }
        };

        let validation = command.and_then(Command::effective_validation);
        let framing_override = match (&validation, command) {
            (Some(_), Some(command)) => command.framing_override.clone(),
            (None, Some(command)) if command.framing_override.is_some() => {
                debug!(command = name, "Framing override ignored, command awaits no reply");
                None
            }
            _ => None,
        };
        let override_token = framing_override.map(|framing| assembler.set_override(framing));

        let pending = match validation {
            Some(config) => match self.registry.register(session_id, &config, name) {
                Ok(pending) => Some(pending),
                Err(e) => {
                    if let Some(token) = override_token {
                        assembler.clear_override(token);
                    }
                    self.report_failure(session_id, name, &e);
                    return Err(e);
                }
            },
            None => None,
        };

        if let Err(e) = self.transport.write(session_id, &bytes).await {
            if let Some(pending) = &pending {
                self.registry.cancel(session_id, pending.id());
            }
            if let Some(token) = override_token {
                assembler.clear_override(token);
            }
            self.report_failure(session_id, name, &e);
            return Err(e);
        }

        self.sinks.frames.on_frame(&FrameRecord {
            session_id,
            direction: Direction::Tx,
            frame: Frame::new(bytes.clone(), unix_millis()),
        });

        info!(
            session_id = %session_id,
            command = name,
            len = bytes.len(),
            awaits_reply = pending.is_some(),
            "Payload sent"
        );

        let reply = match (pending, override_token) {
            (None, _) => Reply::None,
            (Some(pending), Some(token)) => Self::restore_after(assembler, token, pending),
            (Some(pending), None) => Reply::Pending(pending),
        };

        Ok(SendReceipt { bytes, reply })
    }

    /// Sends a saved command with its own payload template.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_command(
        &self,
        session_id: SessionId,
        command: &Command,
        params: &Params,
    ) -> Result<SendReceipt> {
        self.send(session_id, &command.payload, Some(command), params)
            .await
    }

    /// Produces the bytes to write.
    async fn build_bytes(
        &self,
        payload: &str,
        command: Option<&Command>,
        params: &Params,
    ) -> Result<Vec<u8>> {
        let (format, line_ending, declared) = match command {
            Some(c) => (c.format, c.line_ending, c.parameters.as_slice()),
            None => (PayloadFormat::Text, LineEnding::None, &[][..]),
        };

        let text = substitute(payload, params, declared).into_owned();

        let Some(script_name) = command.and_then(|c| c.pre_send_script.as_deref()) else {
            return encode(&text, format, line_ending);
        };

        let script = self.scripts.pre_send(script_name)?;
        let resolved = resolve_params(params, declared);
        let value = self
            .sandbox
            .run(script_name, move || {
                PreSendScript::transform(script.as_ref(), &resolved, &text)
            })
            .await?;

        pre_send_bytes(script_name, value, format, line_ending)
    }

    /// Forwards the reply once this command's override has been expired.
    ///
    /// An override installed by a later command is left in place.
    fn restore_after(
        assembler: FrameAssembler,
        token: OverrideToken,
        pending: PendingValidation,
    ) -> Reply {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = pending.wait().await;
            assembler.clear_override(token);
            let _ = tx.send(result);
        });

        Reply::Restoring { rx }
    }

    /// Looks up a session's assembler.
    fn assembler(&self, session_id: SessionId) -> Result<FrameAssembler> {
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Logs and surfaces a failed send.
    fn report_failure(&self, session_id: SessionId, command: &str, error: &Error) {
        let message = format!("Send of '{command}' failed: {error}");
        warn!(session_id = %session_id, command, error = %error, "Send failed");
        self.sinks
            .log
            .log(session_id, Level::Error, LOG_SOURCE, &message);
        self.sinks.notify.notify(session_id, Level::Error, &message);
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
    use serde_json::json;

    use crate::framing::FramingConfig;
    use crate::script::ScriptRegistry;
    use crate::session::SessionManager;
    use crate::session::sinks::{FrameObserver, NotificationSink};
    use crate::transport::RecordingTransport;
    use crate::validation::ValidationConfig;

    #[derive(Default)]
    struct Frames(Mutex<Vec<FrameRecord>>);

    impl FrameObserver for Frames {
        fn on_frame(&self, record: &FrameRecord) {
            self.0.lock().push(record.clone());
        }
    }

    #[derive(Default)]
    struct Notices(Mutex<Vec<String>>);

    impl NotificationSink for Notices {
        fn notify(&self, _: SessionId, _: Level, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    struct Fixture {
        manager: SessionManager,
        transport: Arc<RecordingTransport>,
        frames: Arc<Frames>,
        session: SessionId,
    }

    fn fixture(scripts: ScriptRegistry) -> Fixture {
        let transport = Arc::new(RecordingTransport::new());
        let frames = Arc::new(Frames::default());
        let manager = SessionManager::builder()
            .transport(transport.clone())
            .scripts(Arc::new(scripts))
            .sinks(Sinks::default().with_frames(frames.clone()))
            .build()
            .unwrap();
        let session = manager.open_new(FramingConfig::delimiter("\\n")).unwrap();
        Fixture {
            manager,
            transport,
            frames,
            session,
        }
    }

    #[tokio::test]
    async fn test_plain_send_writes_text() {
        let f = fixture(ScriptRegistry::new());
        let receipt = f
            .manager
            .executor()
            .send(f.session, "AT", None, &Params::new())
            .await
            .unwrap();

        assert!(!receipt.expects_reply());
        assert_eq!(f.transport.writes_for(f.session), vec![b"AT".to_vec()]);
        assert_eq!(f.frames.0.lock()[0].direction, Direction::Tx);
        assert!(receipt.wait().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture(ScriptRegistry::new());
        let other = SessionId::next();
        let err = f
            .manager
            .executor()
            .send(other, "AT", None, &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_placeholders_and_line_ending() {
        let f = fixture(ScriptRegistry::new());
        let command = Command::text("band", "Set band", "AT+BAND={{band}}")
            .with_line_ending(LineEnding::CrLf)
            .with_parameter("band", Some(json!(3)));

        f.manager
            .executor()
            .send_command(f.session, &command, &Params::new())
            .await
            .unwrap();
        assert_eq!(f.transport.writes_for(f.session), vec![b"AT+BAND=3\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_pre_send_byte_array() {
        let scripts = ScriptRegistry::new();
        scripts.pre_send_fn("checksum", |params: &Params, payload: &str| {
            let addr = params.get("addr").and_then(|v| v.as_u64()).unwrap_or(0);
            let mut bytes: Vec<u64> = vec![addr];
            bytes.extend(payload.bytes().map(u64::from));
            let sum = bytes.iter().sum::<u64>() & 0xFF;
            bytes.push(sum);
            Ok(json!(bytes))
        });
        let f = fixture(scripts);
        let command = Command::text("raw", "Raw", "AB")
            .with_parameter("addr", Some(json!(1)))
            .with_pre_send("checksum");

        let receipt = f
            .manager
            .executor()
            .send_command(f.session, &command, &Params::new())
            .await
            .unwrap();
        assert_eq!(receipt.bytes, vec![1, b'A', b'B', (1 + 0x41 + 0x42) & 0xFF]);
    }

    #[tokio::test]
    async fn test_pre_send_failure_writes_nothing() {
        let scripts = ScriptRegistry::new();
        scripts.pre_send_fn("broken", |_params: &Params, _payload: &str| {
            Err("ReferenceError: crc is not defined".to_string())
        });
        let f = fixture(scripts);
        let command = Command::text("x", "X", "AT")
            .with_pre_send("broken")
            .with_validation(ValidationConfig::always_pass());

        let err = f
            .manager
            .executor()
            .send_command(f.session, &command, &Params::new())
            .await
            .unwrap_err();
        assert!(err.is_script_error());
        assert!(f.transport.writes().is_empty());
        assert_eq!(f.manager.registry().pending_count(f.session), 0);
    }

    #[tokio::test]
    async fn test_write_failure_cancels_expectation() {
        let f = fixture(ScriptRegistry::new());
        f.transport.fail_next("device disconnected");
        let command = Command::text("x", "X", "AT")
            .with_validation(ValidationConfig::contains("OK"))
            .with_framing_override(FramingConfig::timeout(20));

        let err = f
            .manager
            .executor()
            .send_command(f.session, &command, &Params::new())
            .await
            .unwrap_err();
        assert!(err.is_transport_error());
        assert_eq!(f.manager.registry().pending_count(f.session), 0);
        assert_eq!(
            f.manager.active_framing(f.session).unwrap(),
            FramingConfig::delimiter("\\n")
        );
    }

    #[tokio::test]
    async fn test_reply_arriving_during_write_is_matched() {
        let f = fixture(ScriptRegistry::new());
        let manager = f.manager.clone();
        f.transport.set_hook(Arc::new(move |session: SessionId, _bytes: &[u8]| {
            manager.ingest(session, b"OK\n", 1).unwrap();
        }));
        let command = Command::text("ping", "Ping", "AT").with_validation(ValidationConfig::contains("OK"));

        let receipt = f
            .manager
            .executor()
            .send_command(f.session, &command, &Params::new())
            .await
            .unwrap();
        let outcome = receipt.wait().await.unwrap().unwrap();
        assert_eq!(outcome.frame.bytes, b"OK\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_expires_after_reply() {
        let f = fixture(ScriptRegistry::new());
        let command = Command::text("dump", "Dump", "AT+DUMP")
            .with_validation(ValidationConfig::contains("END"))
            .with_timeout(1000)
            .with_framing_override(FramingConfig::delimiter("END"));

        let receipt = f
            .manager
            .executor()
            .send_command(f.session, &command, &Params::new())
            .await
            .unwrap();
        assert_eq!(
            f.manager.active_framing(f.session).unwrap(),
            FramingConfig::delimiter("END")
        );

        f.manager.ingest(f.session, b"line1\nline2\nEND", 5).unwrap();
        let outcome = receipt.wait().await.unwrap().unwrap();
        assert_eq!(outcome.frame.bytes, b"line1\nline2\nEND");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            f.manager.active_framing(f.session).unwrap(),
            FramingConfig::delimiter("\\n")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_override_survives_earlier_reply() {
        let f = fixture(ScriptRegistry::new());
        let first = Command::text("a", "A", "A?")
            .with_validation(ValidationConfig::contains("A").with_timeout(1000))
            .with_framing_override(FramingConfig::delimiter(";"));
        let second = Command::text("b", "B", "B?")
            .with_validation(ValidationConfig::contains("B").with_timeout(1000))
            .with_framing_override(FramingConfig::delimiter("|"));

        let executor = f.manager.executor();
        let first = executor.send_command(f.session, &first, &Params::new()).await.unwrap();
        let second = executor.send_command(f.session, &second, &Params::new()).await.unwrap();

        f.manager.ingest(f.session, b"A|", 1).unwrap();
        assert_eq!(first.wait().await.unwrap().unwrap().frame.bytes, b"A|");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            f.manager.active_framing(f.session).unwrap(),
            FramingConfig::delimiter("|")
        );

        f.manager.ingest(f.session, b"B|", 2).unwrap();
        assert_eq!(second.wait().await.unwrap().unwrap().frame.bytes, b"B|");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            f.manager.active_framing(f.session).unwrap(),
            FramingConfig::delimiter("\\n")
        );
    }

    #[tokio::test]
    async fn test_close_during_pre_send_leaves_nothing_behind() {
        let scripts = ScriptRegistry::new();
        scripts.pre_send_fn("slow", |_params: &Params, payload: &str| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(json!(payload))
        });
        let notices = Arc::new(Notices::default());
        let transport = Arc::new(RecordingTransport::new());
        let manager = SessionManager::builder()
            .transport(transport.clone())
            .scripts(Arc::new(scripts))
            .sinks(Sinks::default().with_notify(notices.clone()))
            .build()
            .unwrap();
        let session = manager.open_new(FramingConfig::delimiter("\\n")).unwrap();

        let closer = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            closer.close(session).unwrap();
        });

        let command = Command::text("x", "X", "AT")
            .with_pre_send("slow")
            .with_validation(ValidationConfig::contains("OK").with_timeout(300));
        let err = manager
            .executor()
            .send_command(session, &command, &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SessionNotFound { .. }));
        assert!(transport.writes().is_empty());
        assert_eq!(manager.registry().pending_count(session), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(notices.0.lock().is_empty());
        assert_eq!(manager.registry().pending_count(session), 0);
    }
}
