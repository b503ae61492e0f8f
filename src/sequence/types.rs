//! Sequence definitions.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::CommandId;

// ============================================================================
// SequenceStep
// ============================================================================

/// One step of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    /// Command to execute.
    pub command_id: CommandId,
    /// Pause before the next step.
    #[serde(default)]
    pub delay_ms: u64,
    /// Abort the remaining steps if this one fails.
    #[serde(default = "default_stop_on_error")]
    pub stop_on_error: bool,
}

fn default_stop_on_error() -> bool {
    true
}

impl SequenceStep {
    /// Creates a step with no delay that aborts on error.
    #[must_use]
    pub fn new(command_id: impl Into<CommandId>) -> Self {
        Self {
            command_id: command_id.into(),
            delay_ms: 0,
            stop_on_error: true,
        }
    }

    /// Sets the pause before the next step.
    #[must_use]
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }
}

// ============================================================================
// Sequence
// ============================================================================

/// Ordered list of steps. Holds no execution state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Display name.
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<SequenceStep>,
}

impl Sequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: SequenceStep) -> Self {
        self.steps.push(step);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_step_defaults() {
        let step: SequenceStep = serde_json::from_value(json!({ "commandId": "reset" })).unwrap();
        assert_eq!(step, SequenceStep::new("reset"));
    }

    #[test]
    fn test_sequence_shape() {
        let sequence = Sequence::new("boot")
            .step(SequenceStep::new("reset").with_delay(200))
            .step(SequenceStep::new("status").with_stop_on_error(false));

        let json = serde_json::to_value(&sequence).unwrap();
        assert_eq!(json["steps"][0]["delayMs"], 200);
        assert_eq!(json["steps"][1]["stopOnError"], false);
    }
}
