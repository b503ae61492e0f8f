//! Expectation configuration and outcomes.
//!
//! A [`ValidationConfig`] describes what counts as "the correct reply" to a
//! command. It is stored with the command and serialized in the same
//! camelCase shape as the rest of the project file:
//!
//! ```json
//! {
//!   "mode": "PATTERN",
//!   "matchType": "REGEX",
//!   "pattern": "^\\+CSQ: (\\d+)",
//!   "transformScript": "csq_to_rssi",
//!   "timeoutMs": 1000
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::framing::Frame;
use crate::identifiers::ExpectationId;
use crate::script::{Params, Variable};

// ============================================================================
// Enums
// ============================================================================

/// How a frame is tested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    /// Any reply counts.
    #[default]
    AlwaysPass,
    /// Text pattern test.
    Pattern,
    /// User predicate script.
    Script,
}

/// Pattern interpretation for [`ValidationMode::Pattern`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Substring test.
    #[default]
    Contains,
    /// Regular expression test.
    Regex,
}

// ============================================================================
// ValidationConfig
// ============================================================================

/// Description of the expected reply to a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Test mode.
    pub mode: ValidationMode,
    /// Pattern for [`ValidationMode::Pattern`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Pattern interpretation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    /// Predicate script name for [`ValidationMode::Script`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate_script: Option<String>,
    /// Transform script run after a match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_script: Option<String>,
    /// Parameters handed to the transform script.
    #[serde(skip_serializing_if = "Params::is_empty")]
    pub params: Params,
    /// Deadline for the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ValidationConfig {
    /// Any reply counts.
    #[inline]
    #[must_use]
    pub fn always_pass() -> Self {
        Self::default()
    }

    /// Reply must contain `pattern`.
    #[must_use]
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            mode: ValidationMode::Pattern,
            pattern: Some(pattern.into()),
            match_type: Some(MatchType::Contains),
            ..Self::default()
        }
    }

    /// Reply must match the regular expression `pattern`.
    #[must_use]
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            mode: ValidationMode::Pattern,
            pattern: Some(pattern.into()),
            match_type: Some(MatchType::Regex),
            ..Self::default()
        }
    }

    /// Reply must satisfy the named predicate script.
    #[must_use]
    pub fn script(name: impl Into<String>) -> Self {
        Self {
            mode: ValidationMode::Script,
            predicate_script: Some(name.into()),
            ..Self::default()
        }
    }

    /// Runs the named transform script after a match.
    #[must_use]
    pub fn with_transform(mut self, name: impl Into<String>) -> Self {
        self.transform_script = Some(name.into());
        self
    }

    /// Sets the reply deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Adds a transform parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

// ============================================================================
// ValidationOutcome
// ============================================================================

/// Result of a matched expectation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Expectation that matched.
    pub expectation_id: ExpectationId,
    /// Command the reply belonged to.
    pub command_name: String,
    /// Frame that matched.
    pub frame: Frame,
    /// Values extracted by the transform script.
    pub variables: Vec<Variable>,
    /// Transform failure, if any. The match itself still stands.
    pub transform_error: Option<String>,
}

impl ValidationOutcome {
    /// Looks up an extracted variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.value)
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
    fn test_builders() {
        let config = ValidationConfig::regex(r"^OK$")
            .with_transform("parse")
            .with_timeout(250)
            .with_param("scale", 10);

        assert_eq!(config.mode, ValidationMode::Pattern);
        assert_eq!(config.match_type, Some(MatchType::Regex));
        assert_eq!(config.timeout_ms, Some(250));
        assert_eq!(config.params["scale"], json!(10));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ValidationConfig::contains("OK").with_timeout(100)).unwrap();
        assert_eq!(
            json,
            json!({ "mode": "PATTERN", "pattern": "OK", "matchType": "CONTAINS", "timeoutMs": 100 })
        );

        let back: ValidationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, ValidationConfig::contains("OK").with_timeout(100));
    }

    #[test]
    fn test_default_is_always_pass() {
        let config: ValidationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.mode, ValidationMode::AlwaysPass);
    }
}
