//! Compiled frame tests.
//!
//! A [`ValidationConfig`] is compiled once when the expectation is
//! registered. Regex compilation errors and unresolved predicate scripts are
//! logged at that point and produce a matcher that never matches.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::script::{ScriptEngine, ValidationScript};

use super::expectation::{MatchType, ValidationConfig, ValidationMode};

// ============================================================================
// Matcher
// ============================================================================

/// Frame test of one expectation.
#[derive(Clone)]
pub(crate) enum Matcher {
    /// Matches every frame.
    Always,
    /// Substring test on the decoded text.
    Contains(String),
    /// Regex test on the decoded text. `None` if the pattern was malformed.
    Regex(Option<Regex>),
    /// User predicate. `script` is `None` if the name did not resolve.
    Script {
        name: String,
        script: Option<Arc<dyn ValidationScript>>,
    },
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Contains(pattern) => f.debug_tuple("Contains").field(pattern).finish(),
            Self::Regex(regex) => f
                .debug_tuple("Regex")
                .field(&regex.as_ref().map(Regex::as_str))
                .finish(),
            Self::Script { name, script } => f
                .debug_struct("Script")
                .field("name", name)
                .field("resolved", &script.is_some())
                .finish(),
        }
    }
}

impl Matcher {
    /// Compiles a validation config.
    pub(crate) fn compile(config: &ValidationConfig, scripts: &dyn ScriptEngine) -> Self {
        match config.mode {
            ValidationMode::AlwaysPass => Self::Always,

            ValidationMode::Pattern => {
                let pattern = config.pattern.clone().unwrap_or_default();
                match config.match_type.unwrap_or_default() {
                    MatchType::Contains => Self::Contains(pattern),
                    MatchType::Regex => match Regex::new(&pattern) {
                        Ok(regex) => Self::Regex(Some(regex)),
                        Err(e) => {
                            warn!(pattern = %pattern, error = %e, "Malformed validation regex, expectation will not match");
                            Self::Regex(None)
                        }
                    },
                }
            }

            ValidationMode::Script => {
                let name = config.predicate_script.clone().unwrap_or_default();
                let script = match scripts.validation(&name) {
                    Ok(script) => Some(script),
                    Err(e) => {
                        warn!(error = %e, "Validation script unavailable, expectation will not match");
                        None
                    }
                };
                Self::Script { name, script }
            }
        }
    }

    /// Tests a frame synchronously. Returns `None` for script matchers.
    pub(crate) fn test_text(&self, text: &str) -> Option<bool> {
        match self {
            Self::Always => Some(true),
            Self::Contains(pattern) => Some(text.contains(pattern.as_str())),
            Self::Regex(regex) => Some(regex.as_ref().is_some_and(|r| r.is_match(text))),
            Self::Script { .. } => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
