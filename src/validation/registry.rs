//! Per-session expectation registry.
//!
//! Every session owns an ordered list of pending expectations and a single
//! check queue. Frames are checked strictly in arrival order: a frame is
//! tested against every earlier-registered expectation, script predicates
//! included, before the next frame is looked at. The earliest matching frame
//! therefore always wins, regardless of how long a predicate takes.
//!
//! # Settlement
//!
//! An expectation settles exactly once. Match, timeout, cancel and clear all
//! remove the entry under the registry lock before replying, so whichever
//! path removes it first is the only one that reports.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::framing::Frame;
use crate::identifiers::{ExpectationId, SessionId};
use crate::options::CoreOptions;
use crate::script::{
    Params, ScriptEngine, ScriptSandbox, TransformContext, TransformScript, Variable,
};
use crate::session::sinks::{Level, Sinks};

use super::expectation::{ValidationConfig, ValidationOutcome};
use super::matcher::Matcher;

// ============================================================================
// Types
// ============================================================================

/// Reply channel of one expectation.
type Reply = oneshot::Sender<Result<ValidationOutcome>>;

/// Log source used for registry entries.
const LOG_SOURCE: &str = "validation";

/// One registered expectation.
struct Expectation {
    id: ExpectationId,
    /// Registration order. Frames only test entries with a lower value.
    seq: u64,
    command_name: String,
    matcher: Matcher,
    transform: Option<String>,
    params: Params,
    reply: Reply,
    timer: JoinHandle<()>,
}

/// A frame waiting in a session's check queue.
struct Check {
    frame: Frame,
    /// Registration sequence number current when the frame arrived.
    horizon: u64,
}

/// Ordered check queue of one session.
struct CheckWorker {
    queue: mpsc::UnboundedSender<Check>,
    task: JoinHandle<()>,
}

/// Pending expectations and check worker of one session.
///
/// The worker starts with the first registration.
#[derive(Default)]
struct SessionExpectations {
    pending: Vec<Expectation>,
    worker: Option<CheckWorker>,
}

struct RegistryInner {
    sessions: Mutex<FxHashMap<SessionId, SessionExpectations>>,
    next_seq: AtomicU64,
    scripts: Arc<dyn ScriptEngine>,
    sandbox: ScriptSandbox,
    sinks: Sinks,
    default_timeout: Duration,
    max_pending: usize,
}

// ============================================================================
// PendingValidation
// ============================================================================

/// Handle to a registered expectation.
#[derive(Debug)]
pub struct PendingValidation {
    id: ExpectationId,
    command_name: String,
    rx: oneshot::Receiver<Result<ValidationOutcome>>,
}

impl PendingValidation {
    /// Expectation ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ExpectationId {
        self.id
    }

    /// Command the expectation belongs to.
    #[inline]
    #[must_use]
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    /// Waits for the expectation to settle.
    ///
    /// # Errors
    ///
    /// - [`Error::ValidationTimeout`] if no frame matched in time
    /// - [`Error::ValidationCancelled`] if the expectation was cancelled or
    ///   its session cleared
    pub async fn wait(self) -> Result<ValidationOutcome> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::validation_cancelled(self.command_name)),
        }
    }
}

// ============================================================================
// ValidationRegistry
// ============================================================================

/// Registry of timed expectations, keyed by session.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ValidationRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for ValidationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRegistry")
            .field("sessions", &self.inner.sessions.lock().len())
            .field("default_timeout", &self.inner.default_timeout)
            .field("max_pending", &self.inner.max_pending)
            .finish_non_exhaustive()
    }
}

impl ValidationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(scripts: Arc<dyn ScriptEngine>, sinks: Sinks, options: &CoreOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(FxHashMap::default()),
                next_seq: AtomicU64::new(0),
                scripts,
                sandbox: ScriptSandbox::new(options.script_time_limit),
                sinks,
                default_timeout: options.default_validation_timeout,
                max_pending: options.max_pending_expectations,
            }),
        }
    }

    /// Starts accepting expectations for a session.
    ///
    /// Returns `false` if the session was already open.
    pub fn open(&self, session_id: SessionId) -> bool {
        let mut sessions = self.inner.sessions.lock();
        if sessions.contains_key(&session_id) {
            return false;
        }
        sessions.insert(session_id, SessionExpectations::default());
        trace!(session_id = %session_id, "Validation session opened");
        true
    }

    /// Returns `true` if the session accepts expectations.
    #[must_use]
    pub fn is_open(&self, session_id: SessionId) -> bool {
        self.inner.sessions.lock().contains_key(&session_id)
    }

    /// Registers an expectation for the next matching frame on a session.
    ///
    /// The deadline is `config.timeout_ms`, or the default validation
    /// timeout when unset. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if the session is not open
    /// - [`Error::TooManyPending`] if the session is at its limit
    /// - [`Error::Config`] if no tokio runtime is available
    pub fn register(
        &self,
        session_id: SessionId,
        config: &ValidationConfig,
        command_name: &str,
    ) -> Result<PendingValidation> {
        let handle = Handle::try_current()
            .map_err(|_| Error::config("validation requires a running tokio runtime"))?;

        let matcher = Matcher::compile(config, self.inner.scripts.as_ref());
        let timeout = config
            .timeout_ms
            .map_or(self.inner.default_timeout, Duration::from_millis);
        let id = ExpectationId::generate();
        let (reply, rx) = oneshot::channel();

        let mut sessions = self.inner.sessions.lock();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::session_not_found(session_id))?;

        if session.pending.len() >= self.inner.max_pending {
            warn!(
                session_id = %session_id,
                pending = session.pending.len(),
                max = self.inner.max_pending,
                "Too many pending expectations"
            );
            return Err(Error::too_many_pending(session_id, self.inner.max_pending));
        }

        if session.worker.is_none() {
            session.worker = Some(self.spawn_worker(&handle, session_id));
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let timer = handle.spawn(expire(
            Arc::downgrade(&self.inner),
            session_id,
            id,
            timeout,
        ));

        session.pending.push(Expectation {
            id,
            seq,
            command_name: command_name.to_string(),
            matcher,
            transform: config.transform_script.clone(),
            params: config.params.clone(),
            reply,
            timer,
        });

        debug!(
            session_id = %session_id,
            expectation_id = %id,
            command = command_name,
            timeout_ms = timeout.as_millis() as u64,
            "Expectation registered"
        );

        Ok(PendingValidation {
            id,
            command_name: command_name.to_string(),
            rx,
        })
    }

    /// Queues a frame to be tested against the session's expectations.
    ///
    /// Only expectations registered before this call are candidates.
    pub fn check(&self, frame: &Frame, session_id: SessionId) {
        let sessions = self.inner.sessions.lock();
        let Some(session) = sessions.get(&session_id) else {
            return;
        };
        let Some(worker) = &session.worker else {
            return;
        };
        if session.pending.is_empty() {
            return;
        }

        let horizon = self.inner.next_seq.load(Ordering::Relaxed);
        let check = Check {
            frame: frame.clone(),
            horizon,
        };
        if worker.queue.send(check).is_err() {
            warn!(session_id = %session_id, "Validation worker gone, frame not checked");
        }
    }

    /// Closes a session: cancels every pending expectation and stops
    /// accepting new ones.
    ///
    /// Timers and the check worker are aborted; waiting callers receive
    /// [`Error::ValidationCancelled`]. Returns the number of expectations
    /// removed.
    pub fn clear(&self, session_id: SessionId) -> usize {
        let Some(session) = self.inner.sessions.lock().remove(&session_id) else {
            return 0;
        };

        if let Some(worker) = session.worker {
            worker.task.abort();
        }
        let count = session.pending.len();

        for expectation in session.pending {
            expectation.timer.abort();
            let _ = expectation
                .reply
                .send(Err(Error::validation_cancelled(expectation.command_name)));
        }

        debug!(session_id = %session_id, cancelled = count, "Expectations cleared");
        count
    }

    /// Cancels one expectation. Returns `false` if it already settled.
    pub fn cancel(&self, session_id: SessionId, id: ExpectationId) -> bool {
        let Some(expectation) = self.inner.take(session_id, id) else {
            return false;
        };

        expectation.timer.abort();
        let _ = expectation
            .reply
            .send(Err(Error::validation_cancelled(expectation.command_name)));

        debug!(session_id = %session_id, expectation_id = %id, "Expectation cancelled");
        true
    }

    /// Returns the number of pending expectations on a session.
    #[must_use]
    pub fn pending_count(&self, session_id: SessionId) -> usize {
        self.inner
            .sessions
            .lock()
            .get(&session_id)
            .map_or(0, |session| session.pending.len())
    }

    /// Returns the default validation deadline.
    #[inline]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Starts the check worker of a session.
    fn spawn_worker(&self, handle: &Handle, session_id: SessionId) -> CheckWorker {
        let (queue, rx) = mpsc::unbounded_channel();
        let task = handle.spawn(run_checks(Arc::downgrade(&self.inner), session_id, rx));

        trace!(session_id = %session_id, "Validation worker started");

        CheckWorker { queue, task }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Processes a session's check queue in arrival order.
async fn run_checks(
    inner: Weak<RegistryInner>,
    session_id: SessionId,
    mut rx: mpsc::UnboundedReceiver<Check>,
) {
    while let Some(check) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.process(session_id, check).await;
    }

    trace!(session_id = %session_id, "Validation worker stopped");
}

/// Rejects an expectation once its deadline passes.
async fn expire(
    inner: Weak<RegistryInner>,
    session_id: SessionId,
    id: ExpectationId,
    timeout: Duration,
) {
    tokio::time::sleep(timeout).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let Some(expectation) = inner.take(session_id, id) else {
        return;
    };

    let timeout_ms = timeout.as_millis() as u64;
    let error = Error::validation_timeout(expectation.command_name, id, timeout_ms);
    let message = error.to_string();

    warn!(
        session_id = %session_id,
        expectation_id = %id,
        timeout_ms,
        "Validation timed out"
    );
    inner
        .sinks
        .log
        .log(session_id, Level::Warn, LOG_SOURCE, &message);
    inner.sinks.notify.notify(session_id, Level::Warn, &message);

    let _ = expectation.reply.send(Err(error));
}

// ============================================================================
// RegistryInner
// ============================================================================

impl RegistryInner {
    /// Removes an expectation, preserving the order of the rest.
    fn take(&self, session_id: SessionId, id: ExpectationId) -> Option<Expectation> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(&session_id)?;
        let index = session.pending.iter().position(|e| e.id == id)?;
        Some(session.pending.remove(index))
    }

    /// Tests one frame against every candidate expectation.
    async fn process(&self, session_id: SessionId, check: Check) {
        let candidates: Vec<(ExpectationId, Matcher)> = {
            let sessions = self.sessions.lock();
            let Some(session) = sessions.get(&session_id) else {
                return;
            };
            session
                .pending
                .iter()
                .filter(|e| e.seq < check.horizon)
                .map(|e| (e.id, e.matcher.clone()))
                .collect()
        };

        if candidates.is_empty() {
            return;
        }

        let frame = check.frame;
        let text = frame.text().into_owned();

        for (id, matcher) in candidates {
            let matched = match matcher.test_text(&text) {
                Some(matched) => matched,
                None => self.run_predicate(session_id, &matcher, &text, &frame).await,
            };
            if !matched {
                continue;
            }

            // Timed out or cancelled while the predicate ran.
            let Some(expectation) = self.take(session_id, id) else {
                continue;
            };
            expectation.timer.abort();
            self.settle(session_id, expectation, &frame, &text).await;
        }
    }

    /// Runs a script predicate. Only a literal `true` counts.
    async fn run_predicate(
        &self,
        session_id: SessionId,
        matcher: &Matcher,
        text: &str,
        frame: &Frame,
    ) -> bool {
        let Matcher::Script {
            name,
            script: Some(script),
        } = matcher
        else {
            return false;
        };

        let script = Arc::clone(script);
        let owned_text = text.to_string();
        let raw = frame.bytes.clone();

        match self
            .sandbox
            .run(name, move || script.check(&owned_text, &raw))
            .await
        {
            Ok(Value::Bool(true)) => true,
            Ok(other) => {
                trace!(session_id = %session_id, script = %name, result = %other, "Predicate did not match");
                false
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Validation script failed");
                self.sinks
                    .log
                    .log(session_id, Level::Error, name, &e.to_string());
                false
            }
        }
    }

    /// Completes a matched expectation.
    async fn settle(&self, session_id: SessionId, expectation: Expectation, frame: &Frame, text: &str) {
        let Expectation {
            id,
            command_name,
            transform,
            params,
            reply,
            ..
        } = expectation;

        let (variables, transform_error) = match transform {
            Some(name) => self.run_transform(session_id, &name, frame, text, params).await,
            None => (Vec::new(), None),
        };

        info!(
            session_id = %session_id,
            expectation_id = %id,
            command = %command_name,
            variables = variables.len(),
            "Validation matched"
        );

        let _ = reply.send(Ok(ValidationOutcome {
            expectation_id: id,
            command_name,
            frame: frame.clone(),
            variables,
            transform_error,
        }));
    }

    /// Runs a transform script and publishes what it extracted.
    async fn run_transform(
        &self,
        session_id: SessionId,
        name: &str,
        frame: &Frame,
        text: &str,
        params: Params,
    ) -> (Vec<Variable>, Option<String>) {
        let script = match self.scripts.transform(name) {
            Ok(script) => script,
            Err(e) => return (Vec::new(), Some(self.report_transform_error(session_id, name, &e))),
        };

        let ctx = TransformContext::new(text, frame.bytes.clone(), params);
        let result = self
            .sandbox
            .run(name, move || {
                let mut ctx = ctx;
                TransformScript::transform(script.as_ref(), &mut ctx)?;
                Ok(ctx.into_parts())
            })
            .await;

        match result {
            Ok((variables, logs)) => {
                for line in &logs {
                    info!(target: "device_link::script", session_id = %session_id, script = name, "{line}");
                    self.sinks.log.log(session_id, Level::Info, name, line);
                }
                for variable in &variables {
                    self.sinks
                        .telemetry
                        .set_variable(session_id, &variable.name, &variable.value);
                }
                if !variables.is_empty() {
                    self.sinks
                        .telemetry
                        .attach_variables(session_id, frame, &variables);
                }
                (variables, None)
            }
            Err(e) => (Vec::new(), Some(self.report_transform_error(session_id, name, &e))),
        }
    }

    /// Logs a transform failure. The match itself still stands.
    fn report_transform_error(&self, session_id: SessionId, name: &str, error: &Error) -> String {
        let message = error.to_string();
        warn!(session_id = %session_id, error = %message, "Transform script failed");
        self.sinks.log.log(session_id, Level::Error, name, &message);
        message
    }
}

// ============================================================================
// Tests
// ============================================================================
