//! Context handed to transform scripts.
//!
//! Bundles the `(text, raw, setVariable, log, params)` arguments of the
//! transform contract. The context owns its data so it can cross into the
//! sandbox thread and come back with the collected variables and log lines.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Params;

// ============================================================================
// Variable
// ============================================================================

/// A named value extracted from a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Extracted value.
    pub value: Value,
}

// ============================================================================
// ScriptLog
// ============================================================================

/// One line logged by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLog {
    /// Name of the script that logged.
    pub script: String,
    /// Logged message.
    pub message: String,
}

// ============================================================================
// TransformContext
// ============================================================================

/// Arguments and side-effect collectors for a transform script.
#[derive(Debug, Clone)]
pub struct TransformContext {
    text: String,
    raw: Vec<u8>,
    params: Params,
    variables: Vec<Variable>,
    logs: Vec<String>,
}

impl TransformContext {
    /// Creates a context for one matched frame.
    #[must_use]
    pub fn new(text: impl Into<String>, raw: impl Into<Vec<u8>>, params: Params) -> Self {
        Self {
            text: text.into(),
            raw: raw.into(),
            params,
            variables: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Frame decoded as text.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Raw frame bytes.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Parameters of the originating command.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Stores a named value. A later call with the same name wins.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.variables.iter_mut().find(|v| v.name == name) {
            existing.value = value;
        } else {
            self.variables.push(Variable { name, value });
        }
    }

    /// Records a log line.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    /// Values stored so far.
    #[inline]
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Consumes the context, returning stored variables and log lines.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Variable>, Vec<String>) {
        (self.variables, self.logs)
    }
}

// ============================================================================
// Tests
// ============================================================================
