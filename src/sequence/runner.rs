//! Sequence execution.
//!
//! Steps run strictly one after another. Each step sends its command and
//! then waits for the registered reply, or for the post-send delay when the
//! command requests no validation. The step's `delay_ms` pause follows
//! before the next step starts.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::CommandExecutor;
use crate::error::{Error, Result};
use crate::identifiers::{CommandId, SessionId};
use crate::script::Params;
use crate::validation::ValidationOutcome;

use super::cancel::CancelToken;
use super::catalog::CommandStore;
use super::types::{Sequence, SequenceStep};

// ============================================================================
// Outcomes
// ============================================================================

/// Result of one executed step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Zero-based step index.
    pub index: usize,
    /// Command the step executed.
    pub command_id: CommandId,
    /// Validation result, if the command requested one and it matched.
    pub validation: Option<ValidationOutcome>,
    /// Failure message, if the step failed.
    pub error: Option<String>,
}

impl StepOutcome {
    /// Returns `true` if the step succeeded.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a sequence run.
#[derive(Debug, Clone, Default)]
pub struct SequenceOutcome {
    /// `true` if every executed step succeeded and the run was not cancelled.
    pub success: bool,
    /// Index of the first failing step.
    pub failed_step: Option<usize>,
    /// Executed steps, in order.
    pub steps: Vec<StepOutcome>,
    /// Set if the run stopped because of a [`CancelToken`].
    pub cancelled: bool,
}

// ============================================================================
// SequenceRunner
// ============================================================================

/// Runs sequences against one session at a time.
#[derive(Clone)]
pub struct SequenceRunner {
    executor: CommandExecutor,
    commands: Arc<dyn CommandStore>,
    post_send_delay: Duration,
}

impl fmt::Debug for SequenceRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceRunner")
            .field("post_send_delay", &self.post_send_delay)
            .finish_non_exhaustive()
    }
}

impl SequenceRunner {
    /// Creates a runner.
    pub(crate) fn new(
        executor: CommandExecutor,
        commands: Arc<dyn CommandStore>,
        post_send_delay: Duration,
    ) -> Self {
        Self {
            executor,
            commands,
            post_send_delay,
        }
    }

    /// Runs every step of `sequence` on a session.
    ///
    /// A failing step with `stop_on_error` ends the run; otherwise the
    /// failure is logged and the next step runs. Cancellation is checked
    /// between steps and during inter-step delays. A step already in flight
    /// is allowed to finish.
    pub async fn run(
        &self,
        session_id: SessionId,
        sequence: &Sequence,
        params: &Params,
        cancel: &CancelToken,
    ) -> SequenceOutcome {
        let mut outcome = SequenceOutcome::default();
        let last = sequence.steps.len().saturating_sub(1);

        info!(
            session_id = %session_id,
            sequence = %sequence.name,
            steps = sequence.steps.len(),
            "Sequence started"
        );

        for (index, step) in sequence.steps.iter().enumerate() {
            if let Err(e) = cancel.check(&sequence.name) {
                debug!(session_id = %session_id, step = index, error = %e, "Sequence stopped before step");
                outcome.cancelled = true;
                break;
            }

            let result = self.run_step(session_id, step, params).await;
            let failed = result.is_err();

            match &result {
                Ok(_) => debug!(session_id = %session_id, step = index, command_id = %step.command_id, "Step succeeded"),
                Err(e) => warn!(
                    session_id = %session_id,
                    step = index,
                    command_id = %step.command_id,
                    stop_on_error = step.stop_on_error,
                    error = %e,
                    "Step failed"
                ),
            }

            let (validation, error) = match result {
                Ok(validation) => (validation, None),
                Err(e) => (None, Some(e.to_string())),
            };
            outcome.steps.push(StepOutcome {
                index,
                command_id: step.command_id.clone(),
                validation,
                error,
            });

            if failed {
                outcome.failed_step.get_or_insert(index);
                if step.stop_on_error {
                    break;
                }
            }

            if index < last && step.delay_ms > 0 {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(step.delay_ms)) => {}
                    () = cancel.cancelled() => {
                        outcome.cancelled = true;
                        break;
                    }
                }
            }
        }

        outcome.success = outcome.failed_step.is_none() && !outcome.cancelled;

        info!(
            session_id = %session_id,
            sequence = %sequence.name,
            success = outcome.success,
            failed_step = ?outcome.failed_step,
            cancelled = outcome.cancelled,
            "Sequence finished"
        );

        outcome
    }

    /// Executes one step and waits for its reply.
    async fn run_step(
        &self,
        session_id: SessionId,
        step: &SequenceStep,
        params: &Params,
    ) -> Result<Option<ValidationOutcome>> {
        let command = self
            .commands
            .command(&step.command_id)
            .ok_or_else(|| Error::command_not_found(step.command_id.clone()))?;

        let receipt = self
            .executor
            .send_command(session_id, &command, params)
            .await?;

        if receipt.expects_reply() {
            receipt.wait().await
        } else {
            tokio::time::sleep(self.post_send_delay).await;
            Ok(None)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
